pub mod availability;
pub mod events;
pub mod lifecycle;
pub mod reservation;
pub mod sessions;
pub mod supabase_store;
pub mod sweeper;
pub mod validation;
pub mod workflow;

pub use availability::AvailabilityResolver;
pub use events::{SlotEventHub, SlotEventReceiver};
pub use reservation::{InMemorySlotStore, SlotReservationStore};
pub use sessions::SessionRegistry;
pub use supabase_store::SupabaseSlotStore;
pub use sweeper::{HoldSweeper, SweepReport};
pub use workflow::{BookingSession, BookingWorkflow};
