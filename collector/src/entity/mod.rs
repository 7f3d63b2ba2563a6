pub mod sub_snapshot;
pub mod traffic_record;

pub use sub_snapshot::Entity as SubSnapshot;
pub use traffic_record::Entity as TrafficRecord;
