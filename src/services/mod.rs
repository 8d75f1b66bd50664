pub mod api;
pub mod observer;
pub mod playback;
pub mod setup;
pub mod wizard;
