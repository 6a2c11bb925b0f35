#![allow(dead_code)]

pub mod backends;
pub mod data;
