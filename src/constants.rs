pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 6;
pub const SUBSCRIPTION_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const TAG_NAME_MAX_LENGTH: usize = 50;
pub const TAG_SLUG_MAX_LENGTH: usize = 50;
pub const INGREDIENT_NAME_MAX_LENGTH: usize = 100;
pub const MEASUREMENT_UNIT_MAX_LENGTH: usize = 20;
pub const RECIPE_NAME_MAX_LENGTH: usize = 200;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const USERNAME_MAX_LENGTH: usize = 150;
pub const PERSON_NAME_MAX_LENGTH: usize = 150;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MIN_INGREDIENT_AMOUNT: i32 = 1;

pub const RECIPE_IMAGE_DIR: &str = "recipes";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_cart.txt";
pub const SHOPPING_LIST_TITLE: &str = "Shopping list:";

/// Known image signatures and the extension stored images get.
pub const IMAGE_SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "png"),
    (b"\xff\xd8\xff", "jpg"),
    (b"GIF87a", "gif"),
    (b"GIF89a", "gif"),
];
