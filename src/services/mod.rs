pub mod assignment;
pub mod attendance;
pub mod auth;
pub mod bot;
pub mod housekeeping;
pub mod meeting;
pub mod project;
pub mod recording;
pub mod room;
pub mod session;
pub mod stt;
pub mod summary;
pub mod task;
pub mod task_extract;
pub mod transcript;
