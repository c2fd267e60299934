//! sqlx query layer for the relational store

pub mod networks;
pub mod users;
