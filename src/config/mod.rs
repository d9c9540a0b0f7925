pub mod catalog;
pub mod registry;

pub use catalog::{ConfigItem, Safety};
pub use registry::{ConfigRegistry, ConfigStore, Effective, Override, Receipt, ReceiptAction};
