pub mod directory;
pub mod slots;

pub use directory::{DirectoryError, DoctorDirectory, InMemoryDoctorDirectory, SupabaseDoctorDirectory};
