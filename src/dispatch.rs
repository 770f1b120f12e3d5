//! Routes decoded events to the field extraction for their kind.

use crate::error::Result;
use crate::event::{Commit, Event, EventBody, Operation, PostRecord, FEED_POST};
use crate::reporter::{Report, Reporter};

/// Which commit operations produce post reports. Deletes never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    CreateOnly,
    CreateAndUpdate,
}

impl CommitPolicy {
    pub fn from_include_updates(include_updates: bool) -> Self {
        if include_updates {
            CommitPolicy::CreateAndUpdate
        } else {
            CommitPolicy::CreateOnly
        }
    }

    pub fn admits(&self, operation: Operation) -> bool {
        match (self, operation) {
            (_, Operation::Create) => true,
            (CommitPolicy::CreateAndUpdate, Operation::Update) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reported,
    Ignored,
}

pub struct Dispatcher<R> {
    policy: CommitPolicy,
    reporter: R,
}

impl<R: Reporter> Dispatcher<R> {
    pub fn new(policy: CommitPolicy, reporter: R) -> Self {
        Self { policy, reporter }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }

    /// Extracts the reportable fields of an event, if its kind has any.
    pub fn extract(&self, event: &Event) -> Result<Option<Report>> {
        match &event.body {
            EventBody::Commit(commit) => self.extract_commit(event, commit),
            EventBody::Identity(identity) => Ok(Some(Report::Identity {
                did: event.did.clone(),
                time_us: event.time_us,
                handle: identity.handle.clone(),
                display_name: identity.display_name.clone(),
                description: identity.description.clone(),
                sequence: identity.sequence,
                time: identity.time.clone(),
            })),
            EventBody::Account(account) => Ok(Some(Report::Account {
                did: event.did.clone(),
                time_us: event.time_us,
                active: account.active,
                sequence: account.sequence,
                time: account.time.clone(),
            })),
            EventBody::Unknown { .. } => Ok(None),
        }
    }

    fn extract_commit(&self, event: &Event, commit: &Commit) -> Result<Option<Report>> {
        if !self.policy.admits(commit.operation) {
            return Ok(None);
        }

        // Other collections are valid but carry nothing we report.
        if commit.collection != FEED_POST {
            return Ok(None);
        }

        let post = PostRecord::from_commit(commit)?;
        Ok(Some(Report::Post {
            did: event.did.clone(),
            time_us: event.time_us,
            operation: commit.operation,
            collection: commit.collection.clone(),
            record_key: commit.record_key.clone(),
            text: post.text,
            created_at: post.created_at,
        }))
    }

    pub fn dispatch(&mut self, event: Event) -> Result<Outcome> {
        match self.extract(&event)? {
            Some(report) => {
                self.reporter.report(&report);
                Ok(Outcome::Reported)
            }
            None => Ok(Outcome::Ignored),
        }
    }
}
