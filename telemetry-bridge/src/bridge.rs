//! The polling loop
//!
//! Each cycle: poll the source, echo and parse its lines, append every good
//! record to the daily log, report it under the update deadline, then sleep
//! (or hand the wait to the operator console). Nothing inside a cycle is
//! fatal; only shutdown or `quit` ends the loop, and the log is closed on
//! the way out.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::config::ChannelProfile;
use crate::console::{Console, ConsoleAction};
use crate::daily_log::{DailyLog, DailyLogError};
use crate::record::{self, Reading};
use crate::report::{update_with_deadline, ChannelPayload, ChannelReporter, ReportError, UPDATE_DEADLINE};
use crate::source::{SensorSource, READING_QUERY};

/// Poll interval until the first record has been seen.
pub const LOCAL_FREQUENCY: Duration = Duration::from_secs(5);

/// asctime-style, as used in the status field.
pub const STATUS_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// What one cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub lines: usize,
    pub records: usize,
    pub dropped: usize,
    pub reported: usize,
    pub failed: usize,
}

pub struct TelemetryBridge<S, R> {
    source: S,
    reporter: R,
    profile: ChannelProfile,
    log: DailyLog,
    console: Option<Console>,
    deadline: Duration,
    seen_record: bool,
}

impl<S: SensorSource, R: ChannelReporter> TelemetryBridge<S, R> {
    pub fn new(source: S, reporter: R, profile: ChannelProfile, log: DailyLog) -> Self {
        Self {
            source,
            reporter,
            profile,
            log,
            console: None,
            deadline: UPDATE_DEADLINE,
            seen_record: false,
        }
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = Some(console);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Wait before the next poll.
    pub fn next_delay(&self) -> Duration {
        if self.seen_record {
            Duration::from_secs(self.profile.update_frequency)
        } else {
            LOCAL_FREQUENCY
        }
    }

    /// Run one Poll/Parse/LogWrite/Report cycle.
    pub async fn poll_once(&mut self, now: DateTime<Local>) -> CycleSummary {
        let mut summary = CycleSummary::default();

        let raw = match self.source.query(READING_QUERY).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Reading {} failed: {}. Continuing...", self.source.describe(), e);
                return summary;
            }
        };

        let extracted = record::extract(&raw);
        summary.lines = extracted.lines.len();
        for line in &extracted.lines {
            println!("{}", line);
        }
        for (line, e) in &extracted.rejected {
            warn!("Dropping malformed record '{}': {}", line, e);
        }
        summary.dropped = extracted.rejected.len();
        if extracted.lines.is_empty() {
            debug!("No output from {}", self.source.describe());
        }

        let timestamp = now.format(STATUS_TIME_FORMAT).to_string();
        for reading in &extracted.readings {
            self.seen_record = true;
            summary.records += 1;

            if let Err(e) = self.log.append(now.date_naive(), &reading.record.to_string()).await {
                warn!("{}", e);
            }
            println!("{}", reading.record);

            match self.report(reading, &timestamp).await {
                Ok(entry) => {
                    println!("{}", entry);
                    summary.reported += 1;
                }
                Err(e) => {
                    warn!("Channel update failed: {}. Continuing...", e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    async fn report(&self, reading: &Reading, timestamp: &str) -> Result<String, ReportError> {
        let payload = ChannelPayload::build(&reading.record, &reading.raw, &self.profile, timestamp)?;
        println!("channelDict = {}", payload);
        update_with_deadline(&self.reporter, &payload, self.deadline).await
    }

    async fn pause(&mut self, delay: Duration) -> ConsoleAction {
        match self.console.as_mut() {
            Some(console) => console.wait(delay, &mut self.source).await,
            None => {
                tokio::time::sleep(delay).await;
                ConsoleAction::Continue
            }
        }
    }

    /// Loop until `shutdown` resolves or the operator quits, then close the
    /// log file.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), DailyLogError> {
        tokio::pin!(shutdown);
        info!(
            "Polling {} for channel {} (every {}s once records arrive)",
            self.source.describe(),
            self.profile.channel_id,
            self.profile.update_frequency
        );

        loop {
            let summary = tokio::select! {
                _ = &mut shutdown => break,
                summary = self.poll_once(Local::now()) => summary,
            };
            debug!("Cycle: {:?}", summary);

            let delay = self.next_delay();
            let action = tokio::select! {
                _ = &mut shutdown => break,
                action = self.pause(delay) => action,
            };
            if action == ConsoleAction::Quit {
                info!("Quit requested");
                break;
            }
        }

        info!("Shutting down, closing log file");
        self.log.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily_log::log_file_name;
    use crate::testing::{Behaviour, MockReporter, ScriptedSource};
    use chrono::TimeZone;

    fn profile() -> ChannelProfile {
        ChannelProfile {
            channel_id: "12345".to_string(),
            write_key: "KEY".to_string(),
            update_frequency: 60,
            channel_keys: vec!["t".to_string(), "h".to_string()],
            api_url: None,
        }
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_logs_and_reports_good_record() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("bridge");
        let source = ScriptedSource::new(["Lucky7 ok\r\n{'t':[68.5],'h':[40],'m':'E'}\r\n{'t':[1\r\n"]);
        let mut bridge = TelemetryBridge::new(
            source,
            MockReporter::new(Behaviour::Accept),
            profile(),
            DailyLog::new(&root),
        );

        assert_eq!(bridge.next_delay(), LOCAL_FREQUENCY);
        let summary = bridge.poll_once(noon()).await;
        assert_eq!(
            summary,
            CycleSummary {
                lines: 3,
                records: 1,
                dropped: 1,
                reported: 1,
                failed: 0
            }
        );
        assert_eq!(bridge.next_delay(), Duration::from_secs(60));

        let sent = bridge.reporter().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].status,
            "Mon Oct 19 12:00:00 2026 {'t':[68.5],'h':[40],'m':'E'}"
        );
        assert_eq!(sent[0].fields[&7], crate::literal::Literal::Int(2));

        let logged = std::fs::read_to_string(log_file_name(&root, noon().date_naive())).unwrap();
        assert_eq!(logged, "{'t': [68.5], 'h': [40], 'm': 'E'}\n");
    }

    #[tokio::test]
    async fn test_payload_failure_still_logs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("bridge");
        let source = ScriptedSource::new(["{'t':[1]}\r\n"]);
        let mut bridge = TelemetryBridge::new(
            source,
            MockReporter::new(Behaviour::Accept),
            profile(),
            DailyLog::new(&root),
        );

        let summary = bridge.poll_once(noon()).await;
        assert_eq!(summary.records, 1);
        assert_eq!(summary.failed, 1);
        assert!(bridge.reporter().sent().is_empty());
        assert!(log_file_name(&root, noon().date_naive()).exists());
    }

    #[tokio::test]
    async fn test_rejected_update_continues() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(["{'t':[1],'h':[2]}\r\n{'t':[3],'h':[4]}\r\n"]);
        let mut bridge = TelemetryBridge::new(
            source,
            MockReporter::new(Behaviour::Reject),
            profile(),
            DailyLog::new(dir.path().join("bridge")),
        );

        let summary = bridge.poll_once(noon()).await;
        assert_eq!(summary.records, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(bridge.reporter().sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_update_abandoned_after_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(["{'t':[1],'h':[2]}\r\n"]);
        let mut bridge = TelemetryBridge::new(
            source,
            MockReporter::new(Behaviour::Hang),
            profile(),
            DailyLog::new(dir.path().join("bridge")),
        );

        let started = tokio::time::Instant::now();
        let summary = bridge.poll_once(noon()).await;
        assert_eq!(summary.failed, 1);
        assert!(started.elapsed() >= UPDATE_DEADLINE);

        // The next cycle runs normally.
        let summary = bridge.poll_once(noon()).await;
        assert_eq!(summary, CycleSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_at_local_frequency_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(["booting\r\n"]);
        let mut bridge = TelemetryBridge::new(
            source,
            MockReporter::new(Behaviour::Accept),
            profile(),
            DailyLog::new(dir.path().join("bridge")),
        );

        bridge
            .run(tokio::time::sleep(Duration::from_secs(12)))
            .await
            .unwrap();
        // t = 0, 5 and 10
        assert_eq!(bridge.source().queries().len(), 3);
    }

    #[tokio::test]
    async fn test_console_quit_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let console = Console::from_std_reader(std::io::Cursor::new("quit\n"));
        let mut bridge = TelemetryBridge::new(
            ScriptedSource::new(Vec::<String>::new()),
            MockReporter::new(Behaviour::Accept),
            profile(),
            DailyLog::new(dir.path().join("bridge")),
        )
        .with_console(console);

        bridge.run(std::future::pending()).await.unwrap();
        assert_eq!(bridge.source().queries(), vec![b"?".to_vec()]);
    }
}
