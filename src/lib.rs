mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
    pub mod shopping_list;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod cache {
    pub mod cache;
}
mod server {
    pub mod handlers;
    pub mod recovery;
    pub mod routes;
}
mod config;
mod constants;
mod media;
mod presentation;

pub use authentication::*;
pub use cache::cache::*;
pub use config::*;
pub use constants::*;
pub use database::*;
pub use media::*;
pub use presentation::*;
pub use server::*;
