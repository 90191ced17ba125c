//! Service orchestration: per-role wiring, the continuous crawl loop,
//! the crawler→indexer submission bridge, the disk-space watchdog, and
//! the atomic status snapshot (§2 component U, §4.18, §6).

pub mod crawl_loop;
pub mod diskspace;
pub mod error;
pub mod index_submit;
pub mod orchestrator;
pub mod status;

pub use crawl_loop::{ContinuousCrawlLoop, CrawlLoopStats, CrawlSink, ReqwestSeedFetcher, SeedFetcher};
pub use diskspace::{is_low, DiskSpaceProvider, SysinfoDiskSpace, LOW_DISK_THRESHOLD_BYTES};
pub use error::{NodeError, NodeResult};
pub use index_submit::{IndexSubmitMessage, IndexSubmitReceiver, IndexSubmitSender, IndexSubmitTransport};
pub use orchestrator::{Node, SearchServices, StatusFragment};
pub use status::{write_status, StatusSnapshot};
