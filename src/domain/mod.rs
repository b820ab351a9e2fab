//! Domain layer: value objects, aggregates and events.
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::*;
pub use events::OrderEvent;
pub use value_objects::{DayOfWeek, Money, PaymentMethod, Quantity, ValueError};
