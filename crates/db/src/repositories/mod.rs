//! Zero-sized repositories, one per table family. Every method takes the
//! pool (or a connection when it must join a transaction) and returns raw
//! `sqlx` results; [`PgWarrantyStore`](crate::PgWarrantyStore) maps them to
//! domain types and `CoreError`.

pub mod barcode_repo;
pub mod batch_repo;
pub mod claim_repo;
pub mod collision_repo;
pub mod repair_repo;
pub mod timeline_repo;

pub use barcode_repo::BarcodeRepo;
pub use batch_repo::BatchRepo;
pub use claim_repo::ClaimRepo;
pub use collision_repo::CollisionRepo;
pub use repair_repo::RepairRepo;
pub use timeline_repo::TimelineRepo;
