//! Deserializers for fields the backend sometimes renders as strings.
//!
//! Decimal columns come back as `"12.5"` from some endpoints and `12.5` from
//! others. A required field holding an empty string is an error, never a
//! zero.

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
	Number(f64),
	Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdOrText {
	Integer(i64),
	Text(String),
}

fn number_from<E: de::Error>(value: NumberOrText) -> Result<f64, E> {
	match value {
		NumberOrText::Number(number) => Ok(number),
		NumberOrText::Text(text) => text
			.trim()
			.parse()
			.map_err(|_| E::custom(format!("expected a number, found {text:?}"))),
	}
}

pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
	number_from(NumberOrText::deserialize(deserializer)?)
}

pub fn optional_number<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<f64>, D::Error> {
	match Option::<NumberOrText>::deserialize(deserializer)? {
		None => Ok(None),
		Some(NumberOrText::Text(text)) if text.trim().is_empty() => Ok(None),
		Some(value) => number_from(value).map(Some),
	}
}

/// Record identifiers are integers on some deployments and strings on others.
pub fn identifier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	match IdOrText::deserialize(deserializer)? {
		IdOrText::Integer(id) => Ok(id.to_string()),
		IdOrText::Text(id) => Ok(id),
	}
}
