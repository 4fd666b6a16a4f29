//! Fixed-layout wire records returned by the broker
//!
//! These are value types: the broker sends them, [`crate::codec`] decodes
//! them, and nothing in the client mutates them afterwards.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: i32,
    pub created_at: u64,
    pub topics_count: i32,
    pub size_bytes: u64,
    pub messages_count: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: i32,
    pub created_at: u64,
    pub partitions_count: i32,
    pub message_expiry: i32,
    pub size_bytes: u64,
    pub messages_count: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub id: i32,
    pub segments_count: i32,
    pub current_offset: i32,
    pub size_bytes: u64,
    pub messages_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroup {
    pub id: i32,
    pub partitions_count: i32,
    pub members_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset {
    pub partition_id: i32,
    pub current_offset: u64,
    pub stored_offset: u64,
}

/// Broker process and storage statistics
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub process_id: i32,
    pub cpu_usage: f32,
    pub memory_usage: u64,
    pub total_memory: u64,
    pub available_memory: u64,
    pub run_time: u64,
    /// Unix seconds
    pub start_time: u64,
    pub read_bytes: u64,
    pub written_bytes: u64,
    pub messages_size_bytes: u64,
    pub streams_count: i32,
    pub topics_count: i32,
    pub partitions_count: i32,
    pub segments_count: i32,
    pub messages_count: u64,
    pub clients_count: i32,
    pub consumer_groups_count: i32,
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
}
