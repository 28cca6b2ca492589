pub mod activity;
pub mod catalog;
pub mod config;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod user;
