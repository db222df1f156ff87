pub mod db;
pub mod marketdb;
pub mod memorydb;
