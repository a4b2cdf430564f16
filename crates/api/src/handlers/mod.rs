pub mod channels;
pub mod events;
pub mod monitors;
