//! Cross-radio eligibility tables for conference and transfer

use telephony_phone_core::RadioClass;

/// How the foreground phone merges a held call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferencePath {
    /// Both calls come from the same radio technology
    SameRadioClass,
    /// The foreground overlay merges calls through its own conference path
    OverlayMerge,
}

/// Conference eligibility keyed by (foreground class, held class)
pub fn conference_path(foreground: RadioClass, held: RadioClass) -> Option<ConferencePath> {
    use RadioClass::*;
    match (foreground, held) {
        (Ims, _) | (Sip, _) if foreground != held => Some(ConferencePath::OverlayMerge),
        (Gsm, Gsm) | (Cdma, Cdma) | (Ims, Ims) | (Sip, Sip) => Some(ConferencePath::SameRadioClass),
        _ => None,
    }
}

/// Whether a radio class can connect its active and held parties
pub fn supports_transfer(class: RadioClass) -> bool {
    match class {
        RadioClass::Gsm | RadioClass::Ims => true,
        RadioClass::Cdma | RadioClass::Sip => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RadioClass::*;

    #[test]
    fn test_conference_table() {
        assert_eq!(conference_path(Gsm, Gsm), Some(ConferencePath::SameRadioClass));
        assert_eq!(conference_path(Cdma, Cdma), Some(ConferencePath::SameRadioClass));
        assert_eq!(conference_path(Ims, Ims), Some(ConferencePath::SameRadioClass));
        assert_eq!(conference_path(Ims, Gsm), Some(ConferencePath::OverlayMerge));
        assert_eq!(conference_path(Sip, Cdma), Some(ConferencePath::OverlayMerge));
        assert_eq!(conference_path(Gsm, Cdma), None);
        assert_eq!(conference_path(Gsm, Ims), None);
        assert_eq!(conference_path(Cdma, Sip), None);
    }

    #[test]
    fn test_transfer_support() {
        assert!(supports_transfer(Gsm));
        assert!(supports_transfer(Ims));
        assert!(!supports_transfer(Cdma));
        assert!(!supports_transfer(Sip));
    }
}
