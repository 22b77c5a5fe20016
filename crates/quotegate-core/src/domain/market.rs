use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Vietnamese exchange a ticker is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Hose,
    Hnx,
    Upcom,
}

impl Market {
    pub const ALL: [Self; 3] = [Self::Hose, Self::Hnx, Self::Upcom];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hose => "HOSE",
            Self::Hnx => "HNX",
            Self::Upcom => "UPCOM",
        }
    }

    fn valid_list() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|market| market.as_str()).collect();
        format!("[{}]", names.join(", "))
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HOSE" => Ok(Self::Hose),
            "HNX" => Ok(Self::Hnx),
            "UPCOM" => Ok(Self::Upcom),
            _ => Err(ValidationError::InvalidMarket {
                value: value.to_owned(),
                valid: Self::valid_list(),
            }),
        }
    }
}
