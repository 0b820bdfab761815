//! Which screen stack the host should mount.

use std::fmt;

use tokio::sync::watch;

use crate::model::{passcode::PasscodeSnapshot, session::SessionSnapshot};

/// A screen stack.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Screen {
    /// Either store is still loading.
    Loading,
    /// Signed out, no passcode: registration and login.
    Welcome,
    /// Signed out with a passcode set: passcode entry only.
    PasscodeLogin,
    /// Signed in but neither verified nor skipped.
    Verification,
    /// Signed in and verified (or skipped) without a passcode.
    PasscodeSetup,
    Main,
}

impl Screen {
    /// Named screens in this stack, first one shown initially.
    pub fn routes(&self) -> &'static [&'static str] {
        match self {
            Self::Loading => &[],
            Self::Welcome => &[
                "Welcome",
                "RegisterEmailConfirmation",
                "RegisterMobileConfirmation",
                "RegisterEmailMobile",
                "RegisterPassword",
                "OtpValidation",
                "Login",
            ],
            Self::PasscodeLogin => &["PassCodeLogin"],
            Self::Verification => &["Verification"],
            Self::PasscodeSetup => &["PasscodeNew", "PasscodeConfirm"],
            Self::Main => &[
                "MainTabs",
                "Profile",
                "SelectLocation",
                "Teams",
                "CreateTeam",
                "TeamDetails",
                "TeamDetailsNew",
                "TeamSelection",
                "TeamMemberDetail",
                "ElectionMain",
                "VotingBallot",
                "VotingBallotItem",
                "VotingBallotItemPreview",
                "Invitations",
                "InvitationAdd",
            ],
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Welcome => "welcome",
            Self::PasscodeLogin => "passcode login",
            Self::Verification => "verification",
            Self::PasscodeSetup => "passcode setup",
            Self::Main => "main",
        };
        f.write_str(name)
    }
}

/// Derive the screen stack from the two store snapshots.
///
/// Verification outranks passcode setup and an existing passcode.
pub fn resolve(session: &SessionSnapshot, passcode: &PasscodeSnapshot) -> Screen {
    if !session.loaded || !passcode.loaded {
        return Screen::Loading;
    }
    match (
        session.is_authenticated(),
        session.is_verified_or_skipped(),
        passcode.is_set,
    ) {
        (false, _, false) => Screen::Welcome,
        (false, _, true) => Screen::PasscodeLogin,
        (true, false, _) => Screen::Verification,
        (true, true, false) => Screen::PasscodeSetup,
        (true, true, true) => Screen::Main,
    }
}

/// Follows both stores and recomputes the screen whenever either changes.
#[derive(Debug, Clone)]
pub struct NavigationGate {
    session: watch::Receiver<SessionSnapshot>,
    passcode: watch::Receiver<PasscodeSnapshot>,
}

impl NavigationGate {
    pub fn new(
        session: watch::Receiver<SessionSnapshot>,
        passcode: watch::Receiver<PasscodeSnapshot>,
    ) -> Self {
        Self { session, passcode }
    }

    pub fn current(&self) -> Screen {
        let session = self.session.borrow();
        let passcode = self.passcode.borrow();
        resolve(&session, &passcode)
    }

    /// Wait until either input changes, then return the resolved screen.
    ///
    /// Returns `None` once a store has been dropped.
    pub async fn changed(&mut self) -> Option<Screen> {
        let changed = tokio::select! {
            changed = self.session.changed() => changed,
            changed = self.passcode.changed() => changed,
        };
        match changed {
            Ok(()) => Some(self.current()),
            Err(_) => None,
        }
    }
}
