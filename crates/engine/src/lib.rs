pub mod access;
pub mod accounts;
pub mod chat;
pub mod courses;
pub mod enrollment;
pub mod fanout;
pub mod feedback;
pub mod materials;
pub mod notifications;
pub mod status;
