//! Client-side search over an in-memory listing collection.
use crate::model::{Listing, ListingCategory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Literal used by every selector to mean "no constraint".
pub const ALL: &str = "All";

static UNDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^under\s*₹?\s*(\d+(?:\.\d+)?)$").expect("valid regex"));
static OVER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^over\s*₹?\s*(\d+(?:\.\d+)?)$").expect("valid regex"));
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^₹?\s*(\d+(?:\.\d+)?)\s*[-–]\s*₹?\s*(\d+(?:\.\d+)?)$").expect("valid regex")
});

/// Either no constraint or one exact value.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector<T> {
    All,
    Only(T),
}

// Not derived: the derive would require `T: Default`, which brackets lack.
impl<T> Default for Selector<T> {
    fn default() -> Self {
        Selector::All
    }
}

impl<T: PartialEq> Selector<T> {
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Selector::All => true,
            Selector::Only(wanted) => wanted == value,
        }
    }
}

impl<T: FromStr> FromStr for Selector<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(ALL) {
            return Ok(Selector::All);
        }
        s.parse().map(Selector::Only)
    }
}

/// Daily-rate bracket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceBracket {
    /// rate < limit
    Under(f64),
    /// low <= rate <= high
    Between(f64, f64),
    /// rate > limit
    Over(f64),
}

impl PriceBracket {
    pub fn contains(&self, rate: f64) -> bool {
        match *self {
            PriceBracket::Under(limit) => rate < limit,
            PriceBracket::Between(low, high) => low <= rate && rate <= high,
            PriceBracket::Over(limit) => rate > limit,
        }
    }

    /// Brackets offered on the browse page.
    pub fn defaults() -> Vec<PriceBracket> {
        vec![
            PriceBracket::Under(200.0),
            PriceBracket::Between(200.0, 400.0),
            PriceBracket::Between(400.0, 600.0),
            PriceBracket::Over(600.0),
        ]
    }
}

impl fmt::Display for PriceBracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceBracket::Under(limit) => write!(f, "Under ₹{}", limit),
            PriceBracket::Between(low, high) => write!(f, "₹{}-₹{}", low, high),
            PriceBracket::Over(limit) => write!(f, "Over ₹{}", limit),
        }
    }
}

impl FromStr for PriceBracket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let number = |raw: &str| {
            raw.parse::<f64>()
                .map_err(|_| format!("invalid amount '{}' in price bracket", raw))
        };
        if let Some(caps) = UNDER_RE.captures(s) {
            return Ok(PriceBracket::Under(number(&caps[1])?));
        }
        if let Some(caps) = OVER_RE.captures(s) {
            return Ok(PriceBracket::Over(number(&caps[1])?));
        }
        if let Some(caps) = RANGE_RE.captures(s) {
            let (low, high) = (number(&caps[1])?, number(&caps[2])?);
            if low > high {
                return Err(format!("price bracket '{}' has low > high", s));
            }
            return Ok(PriceBracket::Between(low, high));
        }
        Err(format!("unrecognised price bracket '{}'", s))
    }
}

/// The four independent browse selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    /// Free text; `None`, blank and "All" all mean no constraint.
    pub search: Option<String>,
    pub category: Selector<ListingCategory>,
    pub region: Selector<String>,
    pub price: Selector<PriceBracket>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        self.matches_search(listing)
            && self.category.accepts(&listing.category)
            && self.region.accepts(&listing.region)
            && match &self.price {
                Selector::All => true,
                Selector::Only(bracket) => bracket.contains(listing.daily_rate),
            }
    }

    fn matches_search(&self, listing: &Listing) -> bool {
        let needle = match self.search.as_deref().map(str::trim) {
            None | Some("") => return true,
            Some(text) if text.eq_ignore_ascii_case(ALL) => return true,
            Some(text) => text.to_lowercase(),
        };
        listing.name.to_lowercase().contains(&needle)
            || listing
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }

    /// Lazily yield the matching listings in their original order.
    pub fn apply<'a>(&'a self, listings: &'a [Listing]) -> impl Iterator<Item = &'a Listing> + 'a {
        listings.iter().filter(move |l| self.matches(l))
    }
}

/// Distinct regions in first-seen order, for building a region selector.
pub fn regions(listings: &[Listing]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for listing in listings {
        if !seen.iter().any(|r| r == &listing.region) {
            seen.push(listing.region.clone());
        }
    }
    seen
}
