//! Crawl pipeline: politeness scheduling, URL/content dedup, robots
//! compliance, fetch-and-extract worker, and recrawl.

pub mod dedup;
pub mod error;
pub mod extract;
pub mod links;
pub mod normalize;
pub mod paywall;
pub mod recrawl;
pub mod robots;
pub mod scheduler;
pub mod simhash;
pub mod worker;

pub use error::{CrawlError, CrawlResult as CrawlOpResult};
