use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use crate::{
    constants::SHOPPING_LIST_TITLE,
    schema::{CartLine, RecipePart},
};

/*
Shopping list document

Shopping list:
1. flour - 300 g
2. milk - 500 ml
*/

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShoppingList {
    pub lines: Vec<CartLine>,
}

impl ShoppingList {
    /// Sums amounts per (ingredient name, unit) across every cart recipe,
    /// ordered by ingredient name.
    pub fn from_parts<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = RecipePart>,
    {
        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        for part in parts {
            *totals
                .entry((part.name, part.measurement_unit))
                .or_insert(0) += i64::from(part.amount);
        }

        Self {
            lines: totals
                .into_iter()
                .map(|((name, measurement_unit), amount)| CartLine {
                    name,
                    measurement_unit,
                    amount,
                })
                .collect(),
        }
    }
}

impl Display for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{SHOPPING_LIST_TITLE}")?;
        for (number, line) in self.lines.iter().enumerate() {
            writeln!(
                f,
                "{}. {} - {} {}",
                number + 1,
                line.name,
                line.amount,
                line.measurement_unit
            )?;
        }
        Ok(())
    }
}

impl From<ShoppingList> for String {
    fn from(value: ShoppingList) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(recipe_id: i32, ingredient_id: i32, name: &str, unit: &str, amount: i32) -> RecipePart {
        RecipePart {
            recipe_id,
            ingredient_id,
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn shared_ingredients_are_summed() {
        let list = ShoppingList::from_parts(vec![
            part(1, 10, "flour", "g", 200),
            part(2, 10, "flour", "g", 100),
        ]);

        assert_eq!(
            list.lines,
            vec![CartLine {
                name: String::from("flour"),
                measurement_unit: String::from("g"),
                amount: 300,
            }]
        );
        assert_eq!(String::from(list), "Shopping list:\n1. flour - 300 g\n");
    }

    #[test]
    fn lines_are_sorted_by_name() {
        let list = ShoppingList::from_parts(vec![
            part(1, 3, "sugar", "g", 50),
            part(1, 1, "eggs", "pcs", 2),
            part(2, 2, "milk", "ml", 250),
            part(2, 1, "eggs", "pcs", 3),
        ]);

        let rendered = list.to_string();
        assert_eq!(
            rendered,
            "Shopping list:\n1. eggs - 5 pcs\n2. milk - 250 ml\n3. sugar - 50 g\n"
        );
    }

    #[test]
    fn same_name_with_other_unit_stays_separate() {
        let list = ShoppingList::from_parts(vec![
            part(1, 1, "salt", "g", 5),
            part(2, 2, "salt", "pinch", 1),
        ]);
        assert_eq!(list.lines.len(), 2);
    }

    #[test]
    fn empty_cart_renders_only_the_title() {
        let list = ShoppingList::from_parts(vec![]);
        assert!(list.lines.is_empty());
        assert_eq!(list.to_string(), "Shopping list:\n");
    }
}
