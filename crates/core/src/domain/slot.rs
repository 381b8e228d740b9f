use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker prefix rendered in place of a price summary that could not be computed.
pub const PRICE_ERROR_MARKER: &str = "ERROR_PRICE";

const MANWON: f64 = 10_000.0;

/// Raw reservation offer as returned by the source, every field optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotFields {
    pub wdt: Option<String>,
    pub wyoil: Option<String>,
    pub wtime: Option<String>,
    #[serde(rename = "CD_COMPANY")]
    pub company_code: Option<String>,
    #[serde(rename = "BRANCH_CD")]
    pub branch_code: Option<String>,
    #[serde(rename = "CD_HALL")]
    pub hall_code: Option<String>,
    #[serde(rename = "WEDDING_DT")]
    pub wedding_date: Option<String>,
    #[serde(rename = "CD_TIME")]
    pub time_code: Option<String>,
    #[serde(rename = "BRANCH_NM")]
    pub branch_name: Option<String>,
    #[serde(rename = "HALL_NM")]
    pub hall_name: Option<String>,
    #[serde(rename = "W_DT")]
    pub display_date: Option<String>,
    #[serde(rename = "W_YOIL")]
    pub weekday: Option<String>,
    #[serde(rename = "YOIL_NO")]
    pub weekday_no: Option<String>,
    #[serde(rename = "W_TIME")]
    pub time: Option<String>,
    #[serde(rename = "RENT_AMT")]
    pub rent_amount: Option<String>,
    #[serde(rename = "RENT_DC")]
    pub rent_discount: Option<String>,
    #[serde(rename = "EAT_AMT")]
    pub eat_amount: Option<String>,
    #[serde(rename = "EAT_DC")]
    pub eat_discount: Option<String>,
    #[serde(rename = "PER_CNT")]
    pub per_count: Option<String>,
    #[serde(rename = "PER_DC")]
    pub per_discount: Option<String>,
    #[serde(rename = "JJIM")]
    pub jjim: Option<String>,
    #[serde(rename = "BRANCH_LOC")]
    pub branch_location: Option<String>,
    #[serde(rename = "HALL_CD")]
    pub hall_cd: Option<String>,
    #[serde(rename = "BRANCH_IMG_CD")]
    pub branch_image_code: Option<String>,
    #[serde(rename = "HALL_IMG_CD")]
    pub hall_image_code: Option<String>,
    #[serde(rename = "ID_YN")]
    pub id_yn: Option<String>,
    #[serde(rename = "TOT_AMT")]
    pub total_amount: Option<String>,
    #[serde(rename = "EAT_DANGA")]
    pub eat_unit_price: Option<String>,
    #[serde(rename = "TEXT_PROMOTION_SMART")]
    pub promotion_text: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlotValidationError {
    #[error("slot is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("slot field `WEDDING_DT` must be YYYYMMDD, got `{0}`")]
    MalformedDate(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
enum PriceError {
    #[error("missing field {0}")]
    Missing(&'static str),
    #[error("invalid integer for {field}: '{value}'")]
    NotInteger { field: &'static str, value: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("amount overflow")]
    Overflow,
}

/// A validated reservation offer.
///
/// Construction checks the fields the label needs, so `label` is total.
/// Price fields stay raw; `price_summary` degrades to an error marker instead
/// of failing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    fields: SlotFields,
}

impl TryFrom<SlotFields> for Slot {
    type Error = SlotValidationError;

    fn try_from(fields: SlotFields) -> Result<Self, Self::Error> {
        let date = required(&fields.wedding_date, "WEDDING_DT")?;
        let digits = date.chars().take(8).filter(char::is_ascii_digit).count();
        if digits < 8 {
            return Err(SlotValidationError::MalformedDate(date.to_owned()));
        }
        required(&fields.weekday, "W_YOIL")?;
        if fields.time.is_none() {
            return Err(SlotValidationError::MissingField("W_TIME"));
        }
        if fields.hall_name.is_none() {
            return Err(SlotValidationError::MissingField("HALL_NM"));
        }
        if fields.hall_image_code.is_none() {
            return Err(SlotValidationError::MissingField("HALL_IMG_CD"));
        }

        Ok(Self { fields })
    }
}

impl Slot {
    pub fn fields(&self) -> &SlotFields {
        &self.fields
    }

    /// `"MM/DD(w) time hall"`, e.g. `"03/15(토) 11:00 그랜드홀"`.
    pub fn label(&self) -> String {
        let date = self.fields.wedding_date.as_deref().unwrap_or_default();
        let month = &date[4..6];
        let day = &date[6..8];
        let weekday = self
            .fields
            .weekday
            .as_deref()
            .and_then(|value| value.chars().next())
            .map(String::from)
            .unwrap_or_default();
        let time = self.fields.time.as_deref().unwrap_or_default();
        let hall = self.fields.hall_name.as_deref().unwrap_or_default();

        format!("{month}/{day}({weekday}) {time} {hall}")
    }

    /// Rent discount and per-person price in units of 10,000, followed by the raw
    /// per-person discount. Never fails; problems render as `ERROR_PRICE <reason>`.
    pub fn price_summary(&self) -> String {
        match self.try_price_summary() {
            Ok(summary) => summary,
            Err(error) => format!("{PRICE_ERROR_MARKER} {error}"),
        }
    }

    /// The line announced for this slot in notifications.
    pub fn notification_line(&self) -> String {
        format!("{} {}", self.label(), self.price_summary())
    }

    fn try_price_summary(&self) -> Result<String, PriceError> {
        let rent_discount = parse_amount(&self.fields.rent_discount, "RENT_DC")?;
        let eat_discount = parse_amount(&self.fields.eat_discount, "EAT_DC")?;
        let per_discount = parse_amount(&self.fields.per_discount, "PER_DC")?;
        let per_person_price = floor_div(eat_discount, per_discount)?;

        Ok(format!(
            "{} {} {per_discount}",
            manwon(rent_discount, 0),
            manwon(per_person_price, 1)
        ))
    }
}

fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, SlotValidationError> {
    match value.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SlotValidationError::MissingField(field)),
    }
}

fn parse_amount(value: &Option<String>, field: &'static str) -> Result<i64, PriceError> {
    let raw = value.as_deref().ok_or(PriceError::Missing(field))?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| PriceError::NotInteger { field, value: raw.to_owned() })
}

fn floor_div(numerator: i64, denominator: i64) -> Result<i64, PriceError> {
    if denominator == 0 {
        return Err(PriceError::DivisionByZero);
    }
    let quotient = numerator.checked_div(denominator).ok_or(PriceError::Overflow)?;
    let remainder = numerator % denominator;
    if remainder != 0 && ((remainder < 0) != (denominator < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Rounds the binary `f64` quotient, so `6500` renders as `0.7` and `65500` as `6.5`.
fn manwon(value: i64, precision: usize) -> String {
    let scaled = value as f64 / MANWON;
    group_thousands(&format!("{scaled:.precision$}"))
}

fn group_thousands(rendered: &str) -> String {
    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}
