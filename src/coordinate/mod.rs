mod driver;
mod keys;
mod memory;
mod subscriber;

pub use driver::ActorLeaderInfo;
pub use driver::AttemptAcquireLeaseOutput;
pub use driver::CoordinateDriver;
pub use driver::CoordinateError;
pub use driver::ExtendLeaseOutput;
pub use driver::GetActorLeaderOutput;
pub use driver::NodeSubscription;
pub use driver::StartActorAndAcquireLeaseOutput;
pub use driver::StartedActorInfo;
pub use memory::MemoryCoordinateDriver;
pub use memory::MemoryStore;

pub(crate) use subscriber::NodeSubscriber;
