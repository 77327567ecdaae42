pub mod dcs;
