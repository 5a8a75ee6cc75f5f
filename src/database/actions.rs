mod carts;
mod favorites;
mod ingredients;
mod recipes;
mod subscriptions;
mod tags;
mod users;

pub use carts::*;
pub use favorites::*;
pub use ingredients::*;
pub use recipes::*;
pub use subscriptions::*;
pub use tags::*;
pub use users::*;

/// Total row count carried by queries using `COUNT(*) OVER()`.
pub trait Counted {
    fn count(&self) -> i64;
}

impl Counted for crate::schema::RecipeRow {
    fn count(&self) -> i64 {
        self.count
    }
}

impl Counted for crate::schema::UserRow {
    fn count(&self) -> i64 {
        self.count
    }
}

pub fn total_count<T: Counted>(rows: &[T]) -> i64 {
    rows.first().map(|row| row.count()).unwrap_or(0)
}
