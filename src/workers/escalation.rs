use std::{sync::Arc, time::Duration};

use tokio::{task, time::interval};
use tracing::{error, info};

use crate::{services::sla::sweep_escalations, state::AppState, utils::time::now};

/// Periodically evaluates every open SLA tracking row and escalates those past
/// their policy's threshold. Deadlines are polled, never timed.
pub struct EscalationSweep {
    state: Arc<AppState>,
    period: Duration,
}

impl EscalationSweep {
    pub fn new(state: Arc<AppState>, period: Duration) -> Self {
        Self {
            state,
            period: period.max(Duration::from_secs(1)),
        }
    }

    pub async fn run(&self) {
        info!(period_secs = self.period.as_secs(), "escalation sweep started");
        let mut ticker = interval(self.period);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(count) => info!(escalated = count, "escalation sweep escalated tickets"),
                Err(err) => error!(error = %err, "escalation sweep failed"),
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<usize, String> {
        let state = self.state.clone();
        task::spawn_blocking(move || {
            let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
            sweep_escalations(&mut conn, None, now())
                .map(|escalated| escalated.len())
                .map_err(|err| err.to_string())
        })
        .await
        .map_err(|join_err| format!("escalation sweep panicked: {join_err}"))?
    }
}
