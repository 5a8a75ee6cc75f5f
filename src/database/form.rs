use std::str::FromStr;

use serde::Deserialize;

use super::{
    error::{Error, HtmlError, TypeError, Validator},
    schema::Uuid,
};
use crate::constants::{
    EMAIL_MAX_LENGTH, INGREDIENT_NAME_MAX_LENGTH, MEASUREMENT_UNIT_MAX_LENGTH,
    MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT, PERSON_NAME_MAX_LENGTH, RECIPE_NAME_MAX_LENGTH,
    TAG_NAME_MAX_LENGTH, TAG_SLUG_MAX_LENGTH, USERNAME_MAX_LENGTH,
};

const REQUIRED: &str = "This field is required";
const BLANK: &str = "This field may not be blank";
const MIN_PASSWORD_LENGTH: usize = 8;

/// Raw query string pairs. Keeps repeated keys, which `tags=a&tags=b` relies on.
#[derive(Debug, Clone, Default)]
pub struct QueryForm {
    inner: Vec<(String, String)>,
}

impl QueryForm {
    pub fn from_query(raw: &str) -> Result<Self, Error> {
        let inner: Vec<(String, String)> = serde_urlencoded::from_str(raw)
            .map_err(|_e| TypeError::new("Malformed query string"))?;

        Ok(Self { inner })
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.inner
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_e| Error::field(key, "A valid integer is required")),
            None => Ok(None),
        }
    }

    /// Absent and empty values read as `false`.
    pub fn get_bool(&self, key: &str) -> Result<bool, Error> {
        match self.get_str(key) {
            None | Some("") => Ok(false),
            Some("1") | Some("true") | Some("True") => Ok(true),
            Some("0") | Some("false") | Some("False") => Ok(false),
            Some(_) => Err(Error::field(key, "Must be a boolean")),
        }
    }
}

/// One `{id, amount}` entry as sent by the client. A missing amount means 1.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IngredientAmountForm {
    pub id: Uuid,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
}

impl IngredientAmountForm {
    fn amount(&self) -> Option<i32> {
        match &self.amount {
            None | Some(serde_json::Value::Null) => Some(MIN_INGREDIENT_AMOUNT),
            Some(value) => value.as_i64().and_then(|n| i32::try_from(n).ok()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: i32,
}

/// Payload shared by recipe create and update.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeForm {
    #[serde(default)]
    pub ingredients: Option<Vec<IngredientAmountForm>>,
    #[serde(default)]
    pub tags: Option<Vec<Uuid>>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub cooking_time: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<String>,
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<Uuid>,
}

impl ValidRecipe {
    pub fn ingredient_ids(&self) -> Vec<Uuid> {
        self.ingredients.iter().map(|i| i.id).collect()
    }
}

impl RecipeForm {
    /// Checks everything that can be checked without the catalog.
    /// `require_image` is set on create; an update keeps the stored image.
    pub fn validate(self, require_image: bool) -> Result<ValidRecipe, Error> {
        let mut v = Validator::new();

        let name = required_text(&mut v, "name", self.name);
        if let Some(name) = &name {
            v.check(
                name.chars().count() <= RECIPE_NAME_MAX_LENGTH,
                "name",
                &format!("Ensure this field has no more than {RECIPE_NAME_MAX_LENGTH} characters"),
            );
        }

        let text = required_text(&mut v, "text", self.text);

        match self.cooking_time {
            Some(time) => v.check(
                time >= MIN_COOKING_TIME,
                "cooking_time",
                &format!("Cooking time must be at least {MIN_COOKING_TIME}"),
            ),
            None => v.add("cooking_time", REQUIRED),
        }

        let image = self.image.filter(|image| !image.trim().is_empty());
        if require_image && image.is_none() {
            v.add("image", REQUIRED);
        }

        let raw_ingredients = self.ingredients.unwrap_or_default();
        if raw_ingredients.is_empty() {
            v.add("ingredients", "At least one ingredient is required");
        }
        let mut ingredients = Vec::with_capacity(raw_ingredients.len());
        let mut malformed = false;
        for raw in raw_ingredients.iter() {
            match raw.amount() {
                Some(amount) => ingredients.push(IngredientAmount { id: raw.id, amount }),
                None => malformed = true,
            }
        }
        if malformed {
            v.add("ingredients", "Amount must be a whole number");
        }
        if ingredients.iter().any(|i| i.amount < MIN_INGREDIENT_AMOUNT) {
            v.add(
                "ingredients",
                &format!("Amount must be at least {MIN_INGREDIENT_AMOUNT}"),
            );
        }
        let mut seen = Vec::with_capacity(ingredients.len());
        for ingredient in ingredients.iter() {
            if seen.contains(&ingredient.id) {
                v.add("ingredients", "Ingredients must not repeat");
                break;
            }
            seen.push(ingredient.id);
        }

        let mut tags: Vec<Uuid> = vec![];
        for tag in self.tags.unwrap_or_default() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        v.finish()?;

        Ok(ValidRecipe {
            name: name.unwrap_or_default(),
            text: text.unwrap_or_default(),
            cooking_time: self.cooking_time.unwrap_or(MIN_COOKING_TIME),
            image,
            ingredients,
            tags,
        })
    }
}

fn required_text(v: &mut Validator, field: &str, value: Option<String>) -> Option<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Some(_) => {
            v.add(field, BLANK);
            None
        }
        None => {
            v.add(field, REQUIRED);
            None
        }
    }
}

fn max_length(v: &mut Validator, field: &str, value: &Option<String>, max: usize) {
    if let Some(value) = value {
        v.check(
            value.chars().count() <= max,
            field,
            &format!("Ensure this field has no more than {max} characters"),
        );
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TagForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TagForm {
    pub fn validate(self) -> Result<ValidTag, Error> {
        let mut v = Validator::new();

        let name = required_text(&mut v, "name", self.name);
        max_length(&mut v, "name", &name, TAG_NAME_MAX_LENGTH);

        let color = required_text(&mut v, "color", self.color);
        if let Some(color) = &color {
            v.check(is_hex_color(color), "color", "Enter a valid hex color, eg. #E26C2D");
        }

        let slug = required_text(&mut v, "slug", self.slug);
        max_length(&mut v, "slug", &slug, TAG_SLUG_MAX_LENGTH);
        if let Some(slug) = &slug {
            v.check(
                slug.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "slug",
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens",
            );
        }

        v.finish()?;

        Ok(ValidTag {
            name: name.unwrap_or_default(),
            color: color.unwrap_or_default().to_uppercase(),
            slug: slug.unwrap_or_default(),
        })
    }
}

fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct IngredientForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub measurement_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidIngredient {
    pub name: String,
    pub measurement_unit: String,
}

impl IngredientForm {
    pub fn validate(self) -> Result<ValidIngredient, Error> {
        let mut v = Validator::new();

        let name = required_text(&mut v, "name", self.name);
        max_length(&mut v, "name", &name, INGREDIENT_NAME_MAX_LENGTH);

        let unit = required_text(&mut v, "measurement_unit", self.measurement_unit);
        max_length(&mut v, "measurement_unit", &unit, MEASUREMENT_UNIT_MAX_LENGTH);

        v.finish()?;

        Ok(ValidIngredient {
            name: name.unwrap_or_default(),
            measurement_unit: unit.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(self) -> Result<ValidRegistration, Error> {
        let mut v = Validator::new();

        let email = required_text(&mut v, "email", self.email);
        max_length(&mut v, "email", &email, EMAIL_MAX_LENGTH);
        if let Some(email) = &email {
            v.check(is_email(email), "email", "Enter a valid email address");
        }

        let username = required_text(&mut v, "username", self.username);
        max_length(&mut v, "username", &username, USERNAME_MAX_LENGTH);
        if let Some(username) = &username {
            v.check(
                username
                    .chars()
                    .all(|c| c.is_alphanumeric() || "_.@+-".contains(c)),
                "username",
                "Enter a valid username. Letters, digits and @/./+/-/_ only",
            );
        }

        let first_name = required_text(&mut v, "first_name", self.first_name);
        max_length(&mut v, "first_name", &first_name, PERSON_NAME_MAX_LENGTH);

        let last_name = required_text(&mut v, "last_name", self.last_name);
        max_length(&mut v, "last_name", &last_name, PERSON_NAME_MAX_LENGTH);

        let password = self.password.unwrap_or_default();
        check_password(&mut v, "password", &password);

        v.finish()?;

        Ok(ValidRegistration {
            email: normalize_email(&email.unwrap_or_default()),
            username: username.unwrap_or_default(),
            first_name: first_name.unwrap_or_default(),
            last_name: last_name.unwrap_or_default(),
            password,
        })
    }
}

fn check_password(v: &mut Validator, field: &str, password: &str) {
    if password.is_empty() {
        v.add(field, REQUIRED);
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        v.add(
            field,
            &format!("This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters"),
        );
    } else if password.chars().all(|c| c.is_ascii_digit()) {
        v.add(field, "This password is entirely numeric");
    }
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Lowercases the domain part only.
pub fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.trim().to_string(),
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl LoginForm {
    pub fn validate(self) -> Result<(String, String), Error> {
        match (self.email, self.password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Ok((normalize_email(&email), password))
            }
            _ => Err(HtmlError::InvalidRequest.new("Unable to log in with provided credentials")),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SetPasswordForm {
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
}

impl SetPasswordForm {
    pub fn validate(self) -> Result<(String, String), Error> {
        let mut v = Validator::new();

        let current = self.current_password.unwrap_or_default();
        v.check(!current.is_empty(), "current_password", REQUIRED);

        let new = self.new_password.unwrap_or_default();
        check_password(&mut v, "new_password", &new);

        v.finish()?;

        Ok((current, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn recipe(ingredients: Vec<(Uuid, i32)>) -> RecipeForm {
        RecipeForm {
            ingredients: Some(
                ingredients
                    .into_iter()
                    .map(|(id, amount)| IngredientAmountForm {
                        id,
                        amount: Some(serde_json::json!(amount)),
                    })
                    .collect(),
            ),
            tags: Some(vec![1, 2]),
            image: Some(String::from("aGVsbG8=")),
            name: Some(String::from("Pancakes")),
            text: Some(String::from("Mix and fry")),
            cooking_time: Some(20),
        }
    }

    fn fields(err: Error) -> Vec<String> {
        err.fields.unwrap_or_default().into_keys().collect()
    }

    #[test]
    fn query_form_keeps_repeated_keys() {
        let form = QueryForm::from_query("tags=breakfast&tags=lunch&author=3").unwrap();
        assert_eq!(form.get_all("tags"), vec!["breakfast", "lunch"]);
        assert_eq!(form.get_number::<i32>("author").unwrap(), Some(3));
        assert_eq!(form.get_number::<i32>("page").unwrap(), None);
    }

    #[test]
    fn query_form_rejects_bad_numbers() {
        let form = QueryForm::from_query("author=abc").unwrap();
        let err = form.get_number::<i32>("author").unwrap_err();
        assert_eq!(fields(err), vec!["author"]);
    }

    #[rstest]
    #[case("is_favorited=1", true)]
    #[case("is_favorited=true", true)]
    #[case("is_favorited=0", false)]
    #[case("is_favorited=", false)]
    #[case("", false)]
    fn query_form_reads_booleans(#[case] raw: &str, #[case] expected: bool) {
        let form = QueryForm::from_query(raw).unwrap();
        assert_eq!(form.get_bool("is_favorited").unwrap(), expected);
    }

    #[test]
    fn valid_recipe_passes_through() {
        let valid = recipe(vec![(1, 200), (2, 1)]).validate(true).unwrap();
        assert_eq!(valid.ingredient_ids(), vec![1, 2]);
        assert_eq!(valid.ingredients[0].amount, 200);
        assert_eq!(valid.tags, vec![1, 2]);
        assert_eq!(valid.cooking_time, 20);
    }

    #[test]
    fn zero_amount_is_rejected() {
        let err = recipe(vec![(1, 0)]).validate(true).unwrap_err();
        assert_eq!(fields(err), vec!["ingredients"]);
    }

    #[test]
    fn missing_amount_defaults_to_one() {
        let form: RecipeForm = serde_json::from_value(serde_json::json!({
            "ingredients": [{ "id": 4 }, { "id": 5, "amount": null }],
            "tags": [],
            "image": "aGVsbG8=",
            "name": "Toast",
            "text": "Toast it.",
            "cooking_time": 3,
        }))
        .unwrap();

        let valid = form.validate(true).unwrap();
        assert_eq!(valid.ingredients[0], IngredientAmount { id: 4, amount: 1 });
        assert_eq!(valid.ingredients[1].amount, 1);
    }

    #[rstest]
    #[case(serde_json::json!(1.5))]
    #[case(serde_json::json!(3_000_000_000_i64))]
    #[case(serde_json::json!("lots"))]
    fn malformed_amount_is_a_field_error(#[case] amount: serde_json::Value) {
        let form: RecipeForm = serde_json::from_value(serde_json::json!({
            "ingredients": [{ "id": 1, "amount": amount }],
            "tags": [1],
            "image": "aGVsbG8=",
            "name": "Pancakes",
            "text": "Mix and fry",
            "cooking_time": 20,
        }))
        .unwrap();

        let err = form.validate(true).unwrap_err();
        let fields = err.fields.unwrap();
        assert_eq!(fields["ingredients"], vec!["Amount must be a whole number"]);
    }

    #[test]
    fn repeated_ingredient_is_rejected() {
        let err = recipe(vec![(1, 100), (2, 5), (1, 50)]).validate(true).unwrap_err();
        let fields = err.fields.unwrap();
        assert_eq!(fields["ingredients"], vec!["Ingredients must not repeat"]);
    }

    #[test]
    fn empty_ingredient_list_is_rejected() {
        let err = recipe(vec![]).validate(true).unwrap_err();
        assert_eq!(fields(err), vec!["ingredients"]);
    }

    #[rstest]
    #[case(Some(0))]
    #[case(Some(-5))]
    #[case(None)]
    fn bad_cooking_time_is_rejected(#[case] time: Option<i32>) {
        let mut form = recipe(vec![(1, 1)]);
        form.cooking_time = time;
        let err = form.validate(true).unwrap_err();
        assert_eq!(fields(err), vec!["cooking_time"]);
    }

    #[test]
    fn image_is_only_required_on_create() {
        let mut form = recipe(vec![(1, 1)]);
        form.image = None;
        assert_eq!(fields(form.clone().validate(true).unwrap_err()), vec!["image"]);
        assert!(form.validate(false).unwrap().image.is_none());
    }

    #[test]
    fn every_problem_is_reported() {
        let err = RecipeForm::default().validate(true).unwrap_err();
        assert_eq!(
            fields(err),
            vec!["cooking_time", "image", "ingredients", "name", "text"]
        );
    }

    #[test]
    fn repeated_tags_collapse() {
        let mut form = recipe(vec![(1, 1)]);
        form.tags = Some(vec![3, 1, 3]);
        assert_eq!(form.validate(true).unwrap().tags, vec![3, 1]);
    }

    #[rstest]
    #[case("#E26C2D", true)]
    #[case("#e26c2d", true)]
    #[case("E26C2D", false)]
    #[case("#E26C2", false)]
    #[case("#GGGGGG", false)]
    fn hex_colors(#[case] color: &str, #[case] ok: bool) {
        assert_eq!(is_hex_color(color), ok);
    }

    #[test]
    fn tag_slug_must_be_a_slug() {
        let err = TagForm {
            name: Some(String::from("Breakfast")),
            color: Some(String::from("#E26C2D")),
            slug: Some(String::from("break fast")),
        }
        .validate()
        .unwrap_err();
        assert_eq!(fields(err), vec!["slug"]);
    }

    #[test]
    fn registration_normalizes_email() {
        let valid = RegisterForm {
            email: Some(String::from("Cook@Example.COM")),
            username: Some(String::from("cook.1")),
            first_name: Some(String::from("Ada")),
            last_name: Some(String::from("Lovelace")),
            password: Some(String::from("s3cret-pass")),
        }
        .validate()
        .unwrap();
        assert_eq!(valid.email, "Cook@example.com");
    }

    #[rstest]
    #[case("short", "password")]
    #[case("12345678901", "password")]
    fn weak_passwords_are_rejected(#[case] password: &str, #[case] field: &str) {
        let err = RegisterForm {
            email: Some(String::from("cook@example.com")),
            username: Some(String::from("cook")),
            first_name: Some(String::from("Ada")),
            last_name: Some(String::from("Lovelace")),
            password: Some(password.to_string()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(fields(err), vec![field.to_string()]);
    }

    #[test]
    fn login_requires_both_fields() {
        let err = LoginForm {
            email: Some(String::from("cook@example.com")),
            password: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.kind, HtmlError::InvalidRequest);
    }
}
