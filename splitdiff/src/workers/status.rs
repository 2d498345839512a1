use crate::workers::state::{SharedWorkerState, WorkerState};

/// Status of a split diff worker, rendered for operational dashboards.
///
/// Reads the state shared with the worker, so it stays current while the worker runs.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    keyspace: String,
    shard: String,
    state: SharedWorkerState,
}

impl WorkerStatus {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>, state: SharedWorkerState) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
            state,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Renders the status as plain text.
    pub fn as_text(&self) -> String {
        let state = self.state();

        let mut result = format!("Working on: {}/{}\n", self.keyspace, self.shard);
        result.push_str(&format!("State: {state}\n"));
        match state {
            WorkerState::Diff => result.push_str("Running...\n"),
            WorkerState::DiffWillFail => {
                result.push_str("Running - have already found differences...\n")
            }
            WorkerState::Done => result.push_str("Success.\n"),
            _ => {}
        }

        result
    }

    /// Renders the status as an HTML fragment.
    pub fn as_html(&self) -> String {
        let state = self.state();

        let mut result = format!(
            "<b>Working on:</b> {}/{}</br>\n",
            escape_html(&self.keyspace),
            escape_html(&self.shard)
        );
        result.push_str(&format!("<b>State:</b> {state}</br>\n"));
        match state {
            WorkerState::Diff => result.push_str("<b>Running</b>:</br>\n"),
            WorkerState::DiffWillFail => {
                result.push_str("<b>Running - have already found differences...</b></br>\n")
            }
            WorkerState::Done => result.push_str("<b>Success</b>:</br>\n"),
            _ => {}
        }

        result
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_in(states: &[WorkerState]) -> WorkerStatus {
        let state = SharedWorkerState::new();
        for next in states {
            state.advance(*next).unwrap();
        }

        WorkerStatus::new("customer", "-80", state)
    }

    #[test]
    fn text_while_initializing() {
        let status = status_in(&[]);

        assert_eq!(
            status.as_text(),
            "Working on: customer/-80\nState: initializing\n"
        );
    }

    #[test]
    fn text_while_diffing() {
        let status = status_in(&[
            WorkerState::FindTargets,
            WorkerState::SyncReplication,
            WorkerState::Diff,
        ]);
        assert_eq!(
            status.as_text(),
            "Working on: customer/-80\nState: running the diff\nRunning...\n"
        );

        status.state.mark_will_fail();
        assert_eq!(
            status.as_text(),
            "Working on: customer/-80\nState: running the diff, already found differences\nRunning - have already found differences...\n"
        );
    }

    #[test]
    fn text_when_done() {
        let status = status_in(&[WorkerState::CleanUp, WorkerState::Done]);

        assert_eq!(
            status.as_text(),
            "Working on: customer/-80\nState: done\nSuccess.\n"
        );
    }

    #[test]
    fn html_escapes_names() {
        let status = WorkerStatus::new("<ks>", "a&b", SharedWorkerState::new());

        assert_eq!(
            status.as_html(),
            "<b>Working on:</b> &lt;ks&gt;/a&amp;b</br>\n<b>State:</b> initializing</br>\n"
        );
    }

    #[test]
    fn html_when_done() {
        let status = status_in(&[WorkerState::CleanUp, WorkerState::Done]);

        assert!(status.as_html().ends_with("<b>Success</b>:</br>\n"));
    }
}
