use lazy_static::lazy_static;
use prometheus::{self, register_int_counter, register_int_gauge, IntCounter, IntGauge};

lazy_static! {
    pub static ref BLOCKS_INGESTED: IntCounter =
        register_int_counter!("hyve_blocks_ingested", "Blocks persisted by MakeBlock.").unwrap();
    pub static ref BLOCKS_ROLLED_BACK: IntCounter = register_int_counter!(
        "hyve_blocks_rolled_back",
        "Blocks rolled back because they touched no watched address"
    )
    .unwrap();
    pub static ref FORKS_DETECTED: IntCounter = register_int_counter!(
        "hyve_forks_detected",
        "Confirmation tracker mismatches between stored and node-reported block hash"
    )
    .unwrap();
    pub static ref BLOCKS_MATURED: IntCounter = register_int_counter!(
        "hyve_blocks_matured",
        "Blocks whose confirmation count reached MATURITY"
    )
    .unwrap();
    pub static ref BLOCKS_GARBAGE_COLLECTED: IntCounter = register_int_counter!(
        "hyve_blocks_garbage_collected",
        "Blocks deleted by the confirmation tracker for having no history rows"
    )
    .unwrap();
    pub static ref EVENTS_APPENDED: IntCounter =
        register_int_counter!("hyve_events_appended", "Rows appended to the event queue").unwrap();
    pub static ref EVENTS_CLAIMED: IntCounter = register_int_counter!(
        "hyve_events_claimed",
        "Event deliveries returned by ClaimBatch across all claimants"
    )
    .unwrap();
    pub static ref EVENTS_PURGED: IntCounter = register_int_counter!(
        "hyve_events_purged",
        "Expired event rows removed by PurgeExpired"
    )
    .unwrap();
    pub static ref LOCAL_HEIGHT: IntGauge = register_int_gauge!(
        "hyve_local_height",
        "Highest block height the ingestion pipeline has persisted"
    )
    .unwrap();
    pub static ref SSE_CONNECTIONS: IntGauge = register_int_gauge!(
        "hyve_sse_connections",
        "Currently open SSE connections"
    )
    .unwrap();
    pub static ref RPC_RETRIES: IntCounter = register_int_counter!(
        "hyve_rpc_retries",
        "MakeBlock retries caused by transient RPC or explorer failures"
    )
    .unwrap();
}
