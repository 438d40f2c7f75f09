/// Session lifecycle notifications for the hosting application.
///
/// `Expired` is where an interactive front-end would send the user back to
/// its sign-in screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    Refreshed,
    Expired { reason: String },
    SignedOut,
}
