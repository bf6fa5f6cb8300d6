//! Rule runs: event id issuance and purging of earlier runs

use uuid::Uuid;

use super::{ChangeLog, EventId, MAX_SEQUENCE};
use crate::{Error, Result};

/// One execution of a rule's fix path.
///
/// Beginning a run deletes every event left by the rule's previous run, so
/// only the latest fix of a rule stays undoable. Ids are then issued from a
/// counter that starts at 1.
#[derive(Debug, Clone)]
pub struct RuleRun {
    rule: u32,
    run_id: Uuid,
    next: u32,
}

impl RuleRun {
    pub fn begin(log: &mut ChangeLog, rule: u32) -> Result<Self> {
        let stale = log.find_rule_changes(rule);
        for id in &stale {
            log.delete_entry(*id)?;
        }

        let run_id = Uuid::new_v4();
        log.set_run(rule, run_id)?;
        {
            let _guard = log.ctx.enter();
            tracing::info!(rule, run = %run_id, purged = stale.len(), "Started rule run");
        }

        Ok(Self {
            rule,
            run_id,
            next: 1,
        })
    }

    pub fn rule(&self) -> u32 {
        self.rule
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Issue the next event id of this run.
    pub fn next_id(&mut self) -> Result<EventId> {
        if self.next > MAX_SEQUENCE {
            return Err(Error::change_log(format!(
                "rule {} issued more than {MAX_SEQUENCE} events in one run",
                self.rule
            )));
        }
        let id = EventId::new(self.rule, self.next);
        self.next += 1;
        Ok(id)
    }
}
