use serde::Serialize;

/// Qualitative result recorded for one student on one content item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Acreditado,
    NoAcreditado,
    NoCorresponde,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Acreditado => "Acreditado",
            Outcome::NoAcreditado => "NoAcreditado",
            Outcome::NoCorresponde => "NoCorresponde",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "Acreditado" => Some(Outcome::Acreditado),
            "NoAcreditado" => Some(Outcome::NoAcreditado),
            "NoCorresponde" => Some(Outcome::NoCorresponde),
            _ => None,
        }
    }
}

/// Maps a grade cell to an outcome. `None` means the cell is skipped and any
/// stored grade for it stays as it is.
pub fn map_token(raw: &str) -> Option<Outcome> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "A" => Some(Outcome::Acreditado),
        "0" => Some(Outcome::NoAcreditado),
        "N/C" | "NC" => Some(Outcome::NoCorresponde),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accredited_tokens_ignore_case_and_padding() {
        for t in ["a", "A", " A ", "\tA"] {
            assert_eq!(map_token(t), Some(Outcome::Acreditado), "{t:?}");
        }
    }

    #[test]
    fn zero_and_not_applicable() {
        assert_eq!(map_token("0"), Some(Outcome::NoAcreditado));
        assert_eq!(map_token("N/C"), Some(Outcome::NoCorresponde));
        assert_eq!(map_token("nc"), Some(Outcome::NoCorresponde));
        assert_eq!(map_token(" n/c"), Some(Outcome::NoCorresponde));
    }

    #[test]
    fn anything_else_is_skipped() {
        for t in ["xyz", "", "AA", "00", "O", "N C", "7", "NA", "-"] {
            assert_eq!(map_token(t), None, "{t:?}");
        }
    }

    #[test]
    fn db_names_roundtrip() {
        for o in [Outcome::Acreditado, Outcome::NoAcreditado, Outcome::NoCorresponde] {
            assert_eq!(Outcome::from_db(o.as_str()), Some(o));
        }
        assert_eq!(Outcome::from_db("acreditado"), None);
    }
}
