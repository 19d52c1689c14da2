pub mod bar;
pub mod equity;
pub mod index;
pub mod metal;
pub mod portfolio;
pub mod resource;
pub mod settings;
pub mod symbol;
