use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
  #[serde(rename = "l")]
  Large,
  #[serde(rename = "m")]
  Medium,
  #[serde(rename = "i")]
  Icon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageColor {
  #[serde(rename = "gray")]
  BlackAndWhite,
  #[serde(rename = "trans")]
  Transparent,
  #[serde(rename = "specific,isc:red")]
  Red,
  #[serde(rename = "specific,isc:orange")]
  Orange,
  #[serde(rename = "specific,isc:yellow")]
  Yellow,
  #[serde(rename = "specific,isc:green")]
  Green,
  #[serde(rename = "specific,isc:teal")]
  Teal,
  #[serde(rename = "specific,isc:blue")]
  Blue,
  #[serde(rename = "specific,isc:purple")]
  Purple,
  #[serde(rename = "specific,isc:pink")]
  Pink,
  #[serde(rename = "specific,isc:white")]
  White,
  #[serde(rename = "specific,isc:gray")]
  Gray,
  #[serde(rename = "specific,isc:black")]
  Black,
  #[serde(rename = "specific,isc:brown")]
  Brown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
  Clipart,
  Lineart,
  Animated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recency {
  #[serde(rename = "d")]
  Day,
  #[serde(rename = "w")]
  Week,
  #[serde(rename = "m")]
  Month,
  #[serde(rename = "y")]
  Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageRights {
  #[serde(rename = "cl")]
  CreativeCommons,
  #[serde(rename = "ol")]
  Commercial,
}

impl ImageSize {
  pub fn code(self) -> &'static str {
    match self {
      ImageSize::Large => "l",
      ImageSize::Medium => "m",
      ImageSize::Icon => "i",
    }
  }
}

impl ImageColor {
  pub fn code(self) -> &'static str {
    match self {
      ImageColor::BlackAndWhite => "gray",
      ImageColor::Transparent => "trans",
      ImageColor::Red => "specific,isc:red",
      ImageColor::Orange => "specific,isc:orange",
      ImageColor::Yellow => "specific,isc:yellow",
      ImageColor::Green => "specific,isc:green",
      ImageColor::Teal => "specific,isc:teal",
      ImageColor::Blue => "specific,isc:blue",
      ImageColor::Purple => "specific,isc:purple",
      ImageColor::Pink => "specific,isc:pink",
      ImageColor::White => "specific,isc:white",
      ImageColor::Gray => "specific,isc:gray",
      ImageColor::Black => "specific,isc:black",
      ImageColor::Brown => "specific,isc:brown",
    }
  }
}

impl ImageType {
  pub fn code(self) -> &'static str {
    match self {
      ImageType::Clipart => "clipart",
      ImageType::Lineart => "lineart",
      ImageType::Animated => "animated",
    }
  }
}

impl Recency {
  pub fn code(self) -> &'static str {
    match self {
      Recency::Day => "d",
      Recency::Week => "w",
      Recency::Month => "m",
      Recency::Year => "y",
    }
  }
}

impl UsageRights {
  pub fn code(self) -> &'static str {
    match self {
      UsageRights::CreativeCommons => "cl",
      UsageRights::Commercial => "ol",
    }
  }
}

/// Optional search knobs. Absent fields are left out of the encoded fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
  pub size: Option<ImageSize>,
  pub color: Option<ImageColor>,
  #[serde(rename = "type")]
  pub image_type: Option<ImageType>,
  pub time: Option<Recency>,
  pub user_rights: Option<UsageRights>,
}

impl SearchFilter {
  pub fn is_empty(&self) -> bool {
    encode(self).is_empty()
  }
}

/// Renders the filter as the `tbs` fragment: `key:value` pairs in the fixed
/// order size, color, type, time, rights.
pub fn encode(filter: &SearchFilter) -> String {
  let parts = [
    filter.size.map(|v| ("isz", v.code())),
    filter.color.map(|v| ("ic", v.code())),
    filter.image_type.map(|v| ("itp", v.code())),
    filter.time.map(|v| ("qdr", v.code())),
    filter.user_rights.map(|v| ("il", v.code())),
  ];

  parts
    .iter()
    .flatten()
    .map(|(key, value)| format!("{}:{}", key, value))
    .collect::<Vec<_>>()
    .join(",")
}

pub fn search_url(base: &str, query: &str, filter: &SearchFilter) -> anyhow::Result<Url> {
  let mut url = Url::parse(base)?;
  {
    let mut params = url.query_pairs_mut();
    params.append_pair("tbm", "isch");
    params.append_pair("q", query);
    let tbs = encode(filter);
    if !tbs.is_empty() {
      params.append_pair("tbs", &tbs);
    }
  }
  Ok(url)
}
