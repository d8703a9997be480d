use std::fmt::{self, Debug, Display};
use std::sync::Arc;

/// Callback asked whether a tool call may proceed.
pub type ApprovalCallback = Arc<dyn Fn(Approval) + Send + Sync>;

/// The answer to an [`Approval`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Run this call.
    Approved,
    /// Run this call and every later call of the same tool in this run.
    ApprovedForSession,
    /// Do not run the call, with an optional reason.
    Rejected(Option<String>),
}

/// Approval for a tool call request.
///
/// Dropping an approval without answering it rejects the call.
pub struct Approval {
    tool: String,
    call_id: String,
    what: String,
    justification: String,
    on_result: Option<Box<dyn FnOnce(ApprovalDecision) + Send>>,
}

impl Approval {
    /// Creates a new approval.
    #[inline]
    pub fn new<S1: Into<String>, S2: Into<String>>(
        what: S1,
        justification: S2,
    ) -> Self {
        Self {
            tool: String::new(),
            call_id: String::new(),
            what: what.into(),
            justification: justification.into(),
            on_result: None,
        }
    }

    /// Attaches the call identity and the channel the answer goes to.
    pub(crate) fn bind(
        mut self,
        tool: &str,
        call_id: &str,
        on_result: impl FnOnce(ApprovalDecision) + Send + 'static,
    ) -> Self {
        self.tool = tool.to_owned();
        self.call_id = call_id.to_owned();
        self.on_result = Some(Box::new(on_result));
        self
    }

    /// Returns the name of the tool that wants to run.
    #[inline]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns the correlation id of the tool call.
    #[inline]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Returns what the approval is for.
    #[inline]
    pub fn what(&self) -> &str {
        &self.what
    }

    /// Returns the justification for the approval.
    #[inline]
    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Approves this call only.
    #[inline]
    pub fn approve(self) {
        self.answer(ApprovalDecision::Approved);
    }

    /// Approves this call and remembers the tool for the rest of the run.
    #[inline]
    pub fn approve_for_session(self) {
        self.answer(ApprovalDecision::ApprovedForSession);
    }

    /// Rejects the request with an optional reason.
    #[inline]
    pub fn reject(self, reason: Option<String>) {
        self.answer(ApprovalDecision::Rejected(reason));
    }

    fn answer(mut self, decision: ApprovalDecision) {
        let Some(on_result) = self.on_result.take() else {
            return;
        };
        (on_result)(decision);
    }
}

impl Debug for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Approval")
            .field("tool", &self.tool)
            .field("call_id", &self.call_id)
            .field("what", &self.what)
            .field("justification", &self.justification)
            .finish_non_exhaustive()
    }
}

impl Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{} ({})", self.what, self.justification))
    }
}
