use std::sync::Arc;

use chrono::{DateTime, Utc};
use finscout_model::ToolCallRequest;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::object::ToolTask;
use super::{
    ApprovalCallback, ApprovalDecision, Error, Registry, ToolContext, ToolOutcome,
};
use crate::credentials::CredentialResolver;
use crate::error::AgentError;
use crate::event::{AgentEvent, EventSender};
use crate::scratchpad::{RunContext, ToolCallRecord};

/// Dispatches the tool calls of one model response.
pub(crate) struct Executor<'a> {
    pub registry: &'a Registry,
    pub approval: Option<&'a ApprovalCallback>,
    pub credentials: &'a Arc<dyn CredentialResolver>,
    pub cancellation: &'a CancellationToken,
}

struct Slot {
    request: ToolCallRequest,
    outcome: Option<ToolOutcome>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn new(request: ToolCallRequest) -> Self {
        Self {
            request,
            outcome: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn finish(&mut self, outcome: ToolOutcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    fn start_event(&self) -> AgentEvent {
        AgentEvent::ToolStart {
            id: self.request.id.clone(),
            tool: self.request.name.clone(),
            args: self.request.arguments.clone(),
        }
    }

    fn end_event(&self, result: ToolOutcome, duration_ms: u64) -> AgentEvent {
        AgentEvent::ToolEnd {
            id: self.request.id.clone(),
            tool: self.request.name.clone(),
            result,
            duration_ms,
        }
    }
}

impl Executor<'_> {
    /// Runs every request of a batch and appends exactly one record per
    /// request to `ctx`, in request order, once the batch settles.
    ///
    /// Approvals are asked one at a time in request order before anything
    /// is dispatched; approved calls then run concurrently.
    pub async fn execute_all(
        &self,
        requests: Vec<ToolCallRequest>,
        ctx: &mut RunContext,
        events: &EventSender,
    ) -> Result<(), AgentError> {
        if self.cancellation.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut slots: Vec<Slot> = requests.into_iter().map(Slot::new).collect();
        let result = self.run_slots(&mut slots, ctx, events).await;
        commit(slots, ctx);
        result
    }

    async fn run_slots(
        &self,
        slots: &mut [Slot],
        ctx: &mut RunContext,
        events: &EventSender,
    ) -> Result<(), AgentError> {
        let mut prepared = Vec::with_capacity(slots.len());
        for (idx, slot) in slots.iter_mut().enumerate() {
            match self.prepare(&slot.request, ctx).await? {
                Ok(call) => prepared.push((idx, call)),
                Err(err) => {
                    debug!("tool call {} rejected: {err}", slot.request.id);
                    let outcome = ToolOutcome::from(Err(err));
                    events.emit(slot.start_event()).await;
                    slot.finish(outcome.clone());
                    events.emit(slot.end_event(outcome, 0)).await;
                }
            }
        }

        if self.cancellation.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut running = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(prepared.len());
        for (idx, task) in prepared {
            let slot = &mut slots[idx];
            events.emit(slot.start_event()).await;
            slot.started_at = Utc::now();

            let handle = task.spawn(&slot.request.name, self.tool_context(slot, events));
            abort_handles.push(handle.abort_handle());
            let started = Instant::now();
            running.push(async move { (idx, started, handle.await) });
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break,
                next = running.next() => {
                    let Some((idx, started, joined)) = next else {
                        return Ok(());
                    };
                    let outcome = ToolOutcome::from_join(joined);
                    let slot = &mut slots[idx];
                    slot.finish(outcome.clone());
                    let duration_ms = started.elapsed().as_millis() as u64;
                    events.emit(slot.end_event(outcome, duration_ms)).await;
                }
            }
        }

        info!("cancelling {} running tool call(s)", running.len());
        for handle in abort_handles {
            handle.abort();
        }
        for slot in slots.iter_mut().filter(|slot| slot.outcome.is_none()) {
            let outcome = ToolOutcome::failure("tool call was cancelled");
            slot.finish(outcome.clone());
            events.emit(slot.end_event(outcome, 0)).await;
        }
        Err(AgentError::Cancelled)
    }

    /// Resolves, validates and gets approval for one request. The inner
    /// error is the failure to record for the call.
    async fn prepare(
        &self,
        request: &ToolCallRequest,
        ctx: &mut RunContext,
    ) -> Result<Result<ToolTask, Error>, AgentError> {
        let Some(tool) = self.registry.get(&request.name) else {
            warn!("tool not found: {}", request.name);
            return Ok(Err(Error::not_found()));
        };
        let call = match Arc::clone(tool).prepare(request.arguments.clone()) {
            Ok(call) => call,
            Err(err) => return Ok(Err(err)),
        };

        let Some(callback) = self.approval else {
            return Ok(Ok(call.task));
        };
        if ctx.is_approved(&request.name) {
            trace!("{} is approved for this run", request.name);
            return Ok(Ok(call.task));
        }

        let (tx, rx) = oneshot::channel();
        callback(call.approval.bind(&request.name, &request.id, move |decision| {
            tx.send(decision).ok();
        }));

        let decision = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(AgentError::Cancelled),
            decision = rx => decision.unwrap_or(ApprovalDecision::Rejected(None)),
        };
        match decision {
            ApprovalDecision::Approved => Ok(Ok(call.task)),
            ApprovalDecision::ApprovedForSession => {
                ctx.approve_for_session(&request.name);
                Ok(Ok(call.task))
            }
            ApprovalDecision::Rejected(why) => {
                if let Some(why) = why {
                    info!("{} call {} rejected: {why}", request.name, request.id);
                }
                Ok(Err(Error::permission_denied()))
            }
        }
    }

    fn tool_context(&self, slot: &Slot, events: &EventSender) -> ToolContext {
        let events = events.clone();
        let id = slot.request.id.clone();
        let tool = slot.request.name.clone();
        ToolContext::new(Arc::clone(self.credentials))
            .with_cancellation(self.cancellation.child_token())
            .with_progress(move |message| {
                events.try_emit(AgentEvent::ToolProgress {
                    id: id.clone(),
                    tool: tool.clone(),
                    message,
                });
            })
    }
}

fn commit(slots: Vec<Slot>, ctx: &mut RunContext) {
    let iteration = ctx.iteration();
    for slot in slots {
        let outcome = slot
            .outcome
            .unwrap_or_else(|| ToolOutcome::failure("tool call was cancelled"));
        let finished_at = slot.finished_at.unwrap_or_else(Utc::now);
        ctx.scratchpad_mut().record_tool_call(ToolCallRecord::new(
            slot.request,
            outcome,
            iteration,
            slot.started_at,
            finished_at,
        ));
    }
}
