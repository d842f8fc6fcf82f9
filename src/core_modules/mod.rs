pub mod activity;
pub mod alert;
pub mod association;
pub mod detection;
pub mod geometry;
pub mod track_store;
pub mod tracker;
