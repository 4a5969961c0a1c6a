use crate::artifacts::{self, Checkpoint};
use crate::config::RunConfig;
use crate::errors::SessionError;
use crate::fee::FeeResolver;
use crate::form::FormDefinition;
use crate::locator::Locator;
use crate::pipeline::FieldPipeline;
use crate::platforms::{DocumentEngine, EngineLauncher};
use crate::report::{RunRecord, RunReport};
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the remote document for the duration of one run.
pub struct SessionController {
    launcher: Arc<dyn EngineLauncher>,
    form: FormDefinition,
}

impl SessionController {
    pub fn new(launcher: Arc<dyn EngineLauncher>, form: FormDefinition) -> Self {
        Self { launcher, form }
    }

    /// Execute one complete run and report on it. Never fails: every
    /// condition ends up in the returned report. The document is released
    /// before this returns, whatever happened.
    pub async fn run(&self, config: &RunConfig) -> RunReport {
        let mut record = RunRecord::new();
        let mut engine: Option<Arc<dyn DocumentEngine>> = None;
        let span = info_span!("run", session_id = %record.session_id, target = %config.target_url);

        let work = self.drive(config, &mut engine, &mut record).instrument(span.clone());
        let result = match tokio::time::timeout(config.run_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::RunTimeout(config.run_timeout.as_millis() as u64)),
        };
        if let Err(e) = result {
            span.in_scope(|| error!("Run aborted: {}", e));
            record.session_error = Some(e);
        }

        if let Some(engine) = engine {
            release(engine.as_ref()).instrument(span.clone()).await;
        }

        let report = record.finish();
        span.in_scope(|| {
            info!(
                status = ?report.status,
                filled = report.counts.filled,
                skipped = report.counts.skipped,
                failed = report.counts.failed,
                fee = report.fee.as_deref().unwrap_or("unresolved"),
                duration_ms = report.duration_ms,
                "Run finished"
            )
        });
        report
    }

    /// Acquire, establish, populate, resolve. `engine` and `record` are
    /// written as progress is made so both survive cancellation.
    async fn drive(
        &self,
        config: &RunConfig,
        engine: &mut Option<Arc<dyn DocumentEngine>>,
        record: &mut RunRecord,
    ) -> Result<(), SessionError> {
        let document = self
            .launcher
            .launch()
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;
        *engine = Some(document.clone());

        self.establish(&document, config).await?;

        let mut form = self.form.clone();
        if let Some(timeout) = config.step_timeout {
            form = form.with_step_timeout(timeout);
        }
        let pipeline = FieldPipeline::new(document.clone(), form.steps);
        pipeline.execute_into(config, &mut record.outcomes).await;

        if let Some(path) = &config.form_screenshot {
            let artifact = artifacts::capture(document.as_ref(), Checkpoint::FormPopulated, path).await;
            record.artifacts.push(artifact);
        }

        let fee = FeeResolver::new(document.clone(), form.fee_display)
            .element_timeout(config.fee_timeout)
            .settle_delay(config.fee_settle_delay)
            .strategy_timeout(config.strategy_timeout)
            .resolve()
            .await;
        if let Err(e) = &fee {
            warn!("Fee unresolved: {}", e);
        }
        record.fee = Some(fee);

        if let Some(path) = &config.fee_screenshot {
            let artifact = artifacts::capture(document.as_ref(), Checkpoint::FeeResolved, path).await;
            record.artifacts.push(artifact);
        }
        Ok(())
    }

    /// Bring the document to a usable order form: navigate, authenticate if
    /// credentials were given, then open a blank order if needed.
    #[instrument(level = "info", skip_all, fields(authenticate = config.credentials().is_some()))]
    pub async fn establish(
        &self,
        engine: &Arc<dyn DocumentEngine>,
        config: &RunConfig,
    ) -> Result<(), SessionError> {
        let url = config.target_url.trim();
        engine
            .navigate(url, config.navigation_timeout)
            .await
            .map_err(|e| SessionError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !config.page_settle.is_zero() {
            tokio::time::sleep(config.page_settle).await;
        }

        match config.credentials() {
            Some(credentials) => {
                self.authenticate(engine, config, &credentials.username, &credentials.password)
                    .await?
            }
            None => debug!("No credentials, assuming an authenticated entry point"),
        }

        self.open_order_form(engine, config).await
    }

    async fn authenticate(
        &self,
        engine: &Arc<dyn DocumentEngine>,
        config: &RunConfig,
        username: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let login = &self.form.login;
        for control in [&login.username, &login.password, &login.submit] {
            wait_for(engine, control, config.auth_timeout)
                .await
                .map_err(|reason| SessionError::AuthenticationControlMissing {
                    control: control.to_string(),
                    reason,
                })?;
        }

        engine
            .fill(&login.username, username)
            .await
            .map_err(|e| SessionError::Authentication(format!("username: {e}")))?;
        engine
            .fill(&login.password, password)
            .await
            .map_err(|e| SessionError::Authentication(format!("password: {e}")))?;
        engine
            .click(&login.submit)
            .await
            .map_err(|e| SessionError::Authentication(format!("submit: {e}")))?;
        info!("Submitted credentials");

        if !config.post_login_wait.is_zero() {
            tokio::time::sleep(config.post_login_wait).await;
        }
        if let Err(e) = engine.wait_until_ready(config.navigation_timeout).await {
            debug!("Post-login document not ready: {}", e);
        }
        Ok(())
    }

    async fn open_order_form(
        &self,
        engine: &Arc<dyn DocumentEngine>,
        config: &RunConfig,
    ) -> Result<(), SessionError> {
        if engine.exists(&self.form.form_ready).await.unwrap_or(false) {
            return Ok(());
        }

        if let Some(new_order) = &self.form.new_order {
            match wait_for(engine, new_order, config.form_timeout).await {
                Ok(()) => {
                    engine
                        .click(new_order)
                        .await
                        .map_err(|e| SessionError::FormNotReady(format!("new order: {e}")))?;
                    debug!("Opened a new order");
                }
                Err(reason) => debug!("No new-order control: {}", reason),
            }
        }

        if let Err(reason) = wait_for(engine, &self.form.form_ready, config.form_timeout).await {
            // Usually a login that bounced back or an unexpected landing page.
            let page = current_page(engine).await;
            return Err(SessionError::FormNotReady(format!("{reason} (page: {page})")));
        }
        Ok(())
    }
}

async fn wait_for(
    engine: &Arc<dyn DocumentEngine>,
    selector: &Selector,
    timeout: Duration,
) -> Result<(), String> {
    Locator::new(engine.clone(), selector.clone())
        .wait(Some(timeout))
        .await
        .map_err(|e| e.to_string())
}

async fn current_page(engine: &Arc<dyn DocumentEngine>) -> String {
    match tokio::time::timeout(Duration::from_secs(2), engine.current_url()).await {
        Ok(Ok(url)) => url,
        Ok(Err(e)) => format!("unknown, {e}"),
        Err(_) => "unknown".to_string(),
    }
}

async fn release(engine: &dyn DocumentEngine) {
    match tokio::time::timeout(TEARDOWN_TIMEOUT, engine.close()).await {
        Ok(Ok(())) => debug!("Session released"),
        Ok(Err(e)) => warn!("Error while releasing session: {}", e),
        Err(_) => warn!("Timed out releasing session"),
    }
}
