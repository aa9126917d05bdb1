pub mod header;
pub mod run;
pub mod version;
