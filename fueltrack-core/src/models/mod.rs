mod amount;
mod fuel_entry;
mod ids;
mod service_entry;
mod vehicle;

pub use amount::parse_amount;
pub use fuel_entry::FuelEntry;
pub use ids::{new_record_id, GUEST_OWNER};
pub use service_entry::{PaymentMode, ServiceEntry};
pub use vehicle::{FuelType, Vehicle, VehicleCategory};
