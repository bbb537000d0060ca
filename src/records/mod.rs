//! Domain records captured in the field.
//!
//! Every record carries a `syncedToServer` flag that only two parties touch:
//! the capturing workflow (which resets it on every local edit) and the sync
//! coordinator (which sets it after the remote endpoint acknowledges).

pub(crate) mod base64_bytes;
mod fuel;
mod handover;
mod kind;
mod photo;
mod report;
mod trip;

pub use fuel::FuelEntry;
pub use handover::{Handover, HandoverStatus};
pub use kind::{Entity, EntityKind, IndexDef, SYNC_COLUMN};
pub use photo::Photo;
pub use report::{CameraReport, ReportStatus};
pub use trip::{LocationPoint, Trip, TripStatus};
