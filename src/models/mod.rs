pub mod activity;
pub mod catalog;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod stock_movement;
pub mod system_config;
pub mod user;
