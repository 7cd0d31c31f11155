//! Booking and allocation engine.

pub mod allocation;
pub mod availability;
pub mod bookings;
pub mod lease;
pub mod provision;
pub mod reconcile;

pub use allocation::{allocate_space, Allocation, Reclaim};
pub use availability::check_fullness;
pub use bookings::{create_booking, BookingRequest};
pub use lease::Lease;
pub use provision::{provision_spaces, ProvisionReport};
pub use reconcile::{reconcile, ReconcileReport, ReconcileSettings};
