pub mod checkin_store;
pub mod popup_directory;
pub mod receipt;
