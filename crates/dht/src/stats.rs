//! Runtime counters for the DHT layer (§8).

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DhtStats {
    pub keys_stored: u64,
    pub keys_published: u64,
    pub gets_performed: u64,
    pub puts_performed: u64,
    pub locks_acquired: u64,
    pub locks_released: u64,
}
