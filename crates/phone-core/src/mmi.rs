//! Supplementary-service (MMI) dial strings
//!
//! Structure per 3GPP TS 22.030:
//!
//! ```text
//! <action><service code>[*SIA[*SIB[*SIC[*PWD]]]]#<dialing number>
//! ```
//!
//! Strings ending in `#` that are not a recognised service request, and very
//! short strings, are USSD.

use crate::dial_string;
use crate::types::ClirMode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static MMI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((\*|#|\*#|\*\*|##)(\d{2,3})(\*([^*#]*)(\*([^*#]*)(\*([^*#]*)(\*([^*#]*))?)?)?)?#)(.*)$",
    )
    .expect("MMI pattern is a valid regex")
});

const GROUP_POUND_STRING: usize = 1;
const GROUP_ACTION: usize = 2;
const GROUP_SERVICE_CODE: usize = 3;
const GROUP_SIA: usize = 5;
const GROUP_SIB: usize = 7;
const GROUP_SIC: usize = 9;
const GROUP_PWD_CONFIRM: usize = 11;
const GROUP_DIALING_NUMBER: usize = 12;

/// Short strings up to this length are USSD
pub const MAX_LENGTH_SHORT_CODE: usize = 2;

pub const SC_CLIP: &str = "30";
pub const SC_CLIR: &str = "31";
pub const SC_WAIT: &str = "43";
pub const SC_PWD: &str = "03";

static NEXT_MMI: AtomicU64 = AtomicU64::new(1);

/// Identifies one MMI session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MmiId(u64);

impl MmiId {
    fn next() -> Self {
        MmiId(NEXT_MMI.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MmiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mmi{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MmiState {
    Pending,
    Cancelled,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MmiAction {
    /// `*`
    Activate,
    /// `#`
    Deactivate,
    /// `*#`
    Interrogate,
    /// `**`
    Registration,
    /// `##`
    Erasure,
}

impl MmiAction {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "*" => Some(MmiAction::Activate),
            "#" => Some(MmiAction::Deactivate),
            "*#" => Some(MmiAction::Interrogate),
            "**" => Some(MmiAction::Registration),
            "##" => Some(MmiAction::Erasure),
            _ => None,
        }
    }
}

/// Call forwarding condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfReason {
    Unconditional,
    Busy,
    NoReply,
    NotReachable,
    All,
    AllConditional,
}

/// Call barring facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarringFacility {
    AllOutgoing,
    OutgoingInternational,
    OutgoingInternationalExceptHome,
    AllIncoming,
    IncomingWhenRoaming,
    AllBarring,
    AllOutgoingBarring,
    AllIncomingBarring,
}

impl BarringFacility {
    fn from_code(sc: &str) -> Option<Self> {
        match sc {
            "33" => Some(Self::AllOutgoing),
            "331" => Some(Self::OutgoingInternational),
            "332" => Some(Self::OutgoingInternationalExceptHome),
            "35" => Some(Self::AllIncoming),
            "351" => Some(Self::IncomingWhenRoaming),
            "330" => Some(Self::AllBarring),
            "333" => Some(Self::AllOutgoingBarring),
            "353" => Some(Self::AllIncomingBarring),
            _ => None,
        }
    }
}

/// Supplementary service addressed by a service code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SsService {
    Clip,
    Clir,
    CallForwarding(CfReason),
    CallWaiting,
    CallBarring(BarringFacility),
    ChangeBarringPassword(BarringFacility),
}

/// Supplementary-service request handed to the radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsRequest {
    pub service: SsService,
    pub action: MmiAction,
    /// Non-empty supplementary fields, in order
    pub args: Vec<String>,
}

/// What processing an MMI code sends to the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmiRequest {
    Ussd(String),
    Service(SsRequest),
}

fn cf_reason(sc: &str) -> Option<CfReason> {
    match sc {
        "21" => Some(CfReason::Unconditional),
        "67" => Some(CfReason::Busy),
        "61" => Some(CfReason::NoReply),
        "62" => Some(CfReason::NotReachable),
        "002" => Some(CfReason::All),
        "004" => Some(CfReason::AllConditional),
        _ => None,
    }
}

fn non_empty(s: Option<regex::Match<'_>>) -> Option<String> {
    s.map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// USSD short code check.
///
/// Strings of at most two characters are USSD, except two-character strings
/// starting with `1` while no call is in progress (those are dialed).
pub fn is_short_code(dial_string: &str, in_call: bool, emergency_numbers: &[String]) -> bool {
    if dial_string.is_empty() || dial_string::is_emergency(dial_string, emergency_numbers) {
        return false;
    }
    if dial_string.len() > MAX_LENGTH_SHORT_CODE {
        return false;
    }
    in_call || dial_string.len() != MAX_LENGTH_SHORT_CODE || !dial_string.starts_with('1')
}

/// One MMI session: a parsed dial string or a network-initiated USSD
#[derive(Debug, Clone)]
pub struct MmiCode {
    id: MmiId,
    action: Option<MmiAction>,
    service_code: Option<String>,
    sia: Option<String>,
    sib: Option<String>,
    sic: Option<String>,
    pwd: Option<String>,
    dialing_number: Option<String>,
    pound_string: Option<String>,
    state: MmiState,
    message: Option<String>,
    pending_ussd: bool,
    ussd_request: bool,
    network_initiated: bool,
}

impl MmiCode {
    fn empty() -> Self {
        Self {
            id: MmiId::next(),
            action: None,
            service_code: None,
            sia: None,
            sib: None,
            sic: None,
            pwd: None,
            dialing_number: None,
            pound_string: None,
            state: MmiState::Pending,
            message: None,
            pending_ussd: false,
            ussd_request: false,
            network_initiated: false,
        }
    }

    /// Parse a network-portion dial string; `None` means "dial it as a call"
    pub fn parse(dial_string: &str, in_call: bool, emergency_numbers: &[String]) -> Option<Self> {
        if dial_string.is_empty() || dial_string::is_emergency(dial_string, emergency_numbers) {
            return None;
        }

        if let Some(caps) = MMI_PATTERN.captures(dial_string) {
            let mut code = Self::empty();
            code.pound_string = non_empty(caps.get(GROUP_POUND_STRING));
            code.action = caps
                .get(GROUP_ACTION)
                .and_then(|m| MmiAction::from_prefix(m.as_str()));
            code.service_code = non_empty(caps.get(GROUP_SERVICE_CODE));
            code.sia = non_empty(caps.get(GROUP_SIA));
            code.sib = non_empty(caps.get(GROUP_SIB));
            code.sic = non_empty(caps.get(GROUP_SIC));
            code.pwd = non_empty(caps.get(GROUP_PWD_CONFIRM));
            code.dialing_number = non_empty(caps.get(GROUP_DIALING_NUMBER));

            // "*100#...#" is a USSD string as a whole
            let ussd_tail = code
                .dialing_number
                .as_deref()
                .is_some_and(|n| n.ends_with('#'));
            if ussd_tail && dial_string.ends_with('#') {
                let mut ussd = Self::empty();
                ussd.pound_string = Some(dial_string.to_string());
                return Some(ussd);
            }
            return Some(code);
        }

        if dial_string.ends_with('#') {
            let mut ussd = Self::empty();
            ussd.pound_string = Some(dial_string.to_string());
            return Some(ussd);
        }

        if is_short_code(dial_string, in_call, emergency_numbers) {
            let mut short = Self::empty();
            short.dialing_number = Some(dial_string.to_string());
            return Some(short);
        }

        None
    }

    /// A USSD session opened by the network
    pub fn network_initiated(message: Option<String>, is_request: bool) -> Self {
        let mut code = Self::empty();
        code.message = message;
        code.ussd_request = is_request;
        code.network_initiated = true;
        code.pending_ussd = is_request;
        code.state = if is_request {
            MmiState::Pending
        } else {
            MmiState::Complete
        };
        code
    }

    /// A USSD reply typed by the user
    pub fn from_ussd_user_input(text: &str) -> Self {
        let mut code = Self::empty();
        code.pound_string = Some(text.to_string());
        code
    }

    pub fn id(&self) -> MmiId {
        self.id
    }

    pub fn state(&self) -> MmiState {
        self.state
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn action(&self) -> Option<MmiAction> {
        self.action
    }

    pub fn service_code(&self) -> Option<&str> {
        self.service_code.as_deref()
    }

    pub fn dialing_number(&self) -> Option<&str> {
        self.dialing_number.as_deref()
    }

    pub fn is_pending_ussd(&self) -> bool {
        self.pending_ussd
    }

    pub fn is_ussd_request(&self) -> bool {
        self.ussd_request
    }

    pub fn is_network_initiated(&self) -> bool {
        self.network_initiated
    }

    /// Whether this is a USSD session rather than a service request
    pub fn is_ussd(&self) -> bool {
        self.supplementary_service().is_none()
            && (self.pound_string.is_some() || self.service_code.is_none())
    }

    /// `*31#<number>` or `#31#<number>`: dial with a one-off CLIR mode
    pub fn is_temporary_mode_clir(&self) -> bool {
        self.service_code.as_deref() == Some(SC_CLIR)
            && self.dialing_number.is_some()
            && matches!(self.action, Some(MmiAction::Activate | MmiAction::Deactivate))
    }

    /// CLIR mode implied by a temporary-mode CLIR code
    pub fn clir_mode(&self) -> ClirMode {
        match (self.service_code.as_deref(), self.action) {
            (Some(SC_CLIR), Some(MmiAction::Activate)) => ClirMode::Suppression,
            (Some(SC_CLIR), Some(MmiAction::Deactivate)) => ClirMode::Invocation,
            _ => ClirMode::Default,
        }
    }

    /// Service addressed by the service code, if it is one this core handles
    pub fn supplementary_service(&self) -> Option<SsService> {
        let sc = self.service_code.as_deref()?;
        if sc == SC_CLIP {
            return Some(SsService::Clip);
        }
        if sc == SC_CLIR {
            return Some(SsService::Clir);
        }
        if sc == SC_WAIT {
            return Some(SsService::CallWaiting);
        }
        if sc == SC_PWD {
            let facility = match self.sia.as_deref() {
                None => BarringFacility::AllBarring,
                Some(code) => BarringFacility::from_code(code)?,
            };
            return Some(SsService::ChangeBarringPassword(facility));
        }
        if let Some(reason) = cf_reason(sc) {
            return Some(SsService::CallForwarding(reason));
        }
        BarringFacility::from_code(sc).map(SsService::CallBarring)
    }

    /// Work out what to send; `Err` carries the failure message
    pub fn to_request(&self) -> Result<MmiRequest, String> {
        if let Some(service) = self.supplementary_service() {
            let action = self.action.ok_or_else(|| "Invalid MMI code".to_string())?;
            let allowed = match service {
                SsService::Clip => action == MmiAction::Interrogate,
                SsService::Clir | SsService::CallWaiting | SsService::CallBarring(_) => matches!(
                    action,
                    MmiAction::Activate | MmiAction::Deactivate | MmiAction::Interrogate
                ),
                SsService::CallForwarding(_) => true,
                SsService::ChangeBarringPassword(_) => {
                    matches!(action, MmiAction::Activate | MmiAction::Registration)
                }
            };
            if !allowed {
                return Err("Invalid or unsupported MMI code".to_string());
            }

            if let SsService::ChangeBarringPassword(_) = service {
                if self.sic.is_none() || self.sic != self.pwd {
                    return Err("Passwords do not match".to_string());
                }
            }

            let args = [&self.sia, &self.sib, &self.sic, &self.pwd]
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            return Ok(MmiRequest::Service(SsRequest {
                service,
                action,
                args,
            }));
        }

        if let Some(pound) = &self.pound_string {
            return Ok(MmiRequest::Ussd(pound.clone()));
        }
        if let Some(short) = &self.dialing_number {
            return Ok(MmiRequest::Ussd(short.clone()));
        }
        Err("Invalid or unsupported MMI code".to_string())
    }

    /// Message shown when a service request succeeds
    pub fn success_message(&self) -> &'static str {
        match self.action {
            Some(MmiAction::Activate) => "Service was enabled",
            Some(MmiAction::Deactivate) => "Service has been disabled",
            Some(MmiAction::Registration) => "Registration was successful",
            Some(MmiAction::Erasure) => "Erasure was successful",
            Some(MmiAction::Interrogate) | None => "Request completed",
        }
    }

    pub(crate) fn set_pending_ussd(&mut self, pending: bool) {
        self.pending_ussd = pending;
    }

    pub(crate) fn set_ussd_request(&mut self, request: bool) {
        self.ussd_request = request;
    }

    pub(crate) fn finish(&mut self, state: MmiState, message: Option<String>) {
        self.state = state;
        self.message = message;
        if state != MmiState::Pending {
            self.pending_ussd = false;
        }
    }
}
