//! Decision engine
//!
//! A candidate is applied only if its version is strictly newer than the
//! running version. Past that gate a forced record is applied outright,
//! anything else goes through a [`Confirm`] policy.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::GrayscalePolicy;
use crate::error::{Result, UpdateError};
use crate::hooks::Decider;
use crate::record::UpdateRecord;
use crate::version::AppVersion;

/// What the user is asked to confirm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub current: AppVersion,
    pub target: AppVersion,
    pub address: String,
    pub hash: String,
    pub changelog: String,
    pub extension: String,
    /// The caller's grayscale tag is in the record's rollout audience
    pub in_audience: bool,
}

impl Prompt {
    pub fn new(current: AppVersion, target: AppVersion, record: &UpdateRecord, in_audience: bool) -> Self {
        Self {
            current,
            target,
            address: record.address.clone(),
            hash: record.hash.clone(),
            changelog: record.changelog.clone(),
            extension: record.extension.clone(),
            in_audience,
        }
    }

    pub fn title(&self) -> &'static str {
        if self.in_audience {
            "A preview release is available for your rollout group. Update now?"
        } else {
            "A new version is available. Update now?"
        }
    }

    /// Multi-line summary of the update
    pub fn body(&self) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "Current version: {}", self.current);
        let _ = writeln!(body, "Target version:  {}", self.target);
        let _ = writeln!(body, "Package:         {}", self.address);
        let _ = writeln!(body, "Hash:            {}", self.hash);
        let _ = writeln!(body, "Changelog:       {}", self.changelog);
        let _ = write!(body, "Extension:       {}", self.extension);
        body
    }
}

/// Asks whether a non-forced update should be applied
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &Prompt) -> Result<bool>;
}

impl<F> Confirm for F
where
    F: Fn(&Prompt) -> Result<bool> + Send + Sync,
{
    fn confirm(&self, prompt: &Prompt) -> Result<bool> {
        self(prompt)
    }
}

/// Blocking yes/no prompt on the controlling terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleConfirm;

impl Confirm for ConsoleConfirm {
    fn confirm(&self, prompt: &Prompt) -> Result<bool> {
        eprintln!("{}", prompt.body());
        dialoguer::Confirm::new()
            .with_prompt(prompt.title())
            .default(false)
            .interact()
            .map_err(|e| UpdateError::Prompt(format!("input error: {e}")))
    }
}

/// Fixed answer, for hosts without a terminal
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, _prompt: &Prompt) -> Result<bool> {
        Ok(self.0)
    }
}

/// Version gate, grayscale policy, force flag, then confirmation
pub struct DefaultDecider {
    current: AppVersion,
    confirm: Arc<dyn Confirm>,
    policy: GrayscalePolicy,
}

impl DefaultDecider {
    pub fn new(current: AppVersion, confirm: Arc<dyn Confirm>, policy: GrayscalePolicy) -> Self {
        Self {
            current,
            confirm,
            policy,
        }
    }

    pub fn current(&self) -> AppVersion {
        self.current
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, record: &UpdateRecord, grayscale: Option<&str>) -> Result<bool> {
        let target = record.parsed_version()?;
        if target <= self.current {
            return Ok(false);
        }

        let in_audience = !record.grayscale.trim().is_empty() && record.targets(grayscale);
        if self.policy == GrayscalePolicy::Restrict && !record.targets(grayscale) {
            tracing::debug!(
                version = %record.version,
                audience = %record.grayscale,
                "Caller outside rollout audience"
            );
            return Ok(false);
        }

        if record.force {
            return Ok(true);
        }

        self.confirm
            .confirm(&Prompt::new(self.current, target, record, in_audience))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn decider(current: &str, answer: bool, policy: GrayscalePolicy) -> DefaultDecider {
        DefaultDecider::new(
            AppVersion::parse(current).unwrap(),
            Arc::new(AutoConfirm(answer)),
            policy,
        )
    }

    fn record(version: &str) -> UpdateRecord {
        UpdateRecord::new(version, "https://example.com/pkg.tar.gz")
    }

    #[test]
    fn test_older_or_equal_is_rejected_without_prompt() {
        let asked = Arc::new(AtomicUsize::new(0));
        let counter = asked.clone();
        let confirm = move |_: &Prompt| -> Result<bool> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        };
        let d = DefaultDecider::new(
            AppVersion::parse("1.0.0.0").unwrap(),
            Arc::new(confirm),
            GrayscalePolicy::Ignore,
        );

        let mut forced = record("0.9.0.0");
        forced.force = true;
        assert!(!d.decide(&forced, None).unwrap());
        assert!(!d.decide(&record("1.0"), None).unwrap());
        assert_eq!(asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_force_skips_prompt() {
        let d = decider("1.0.0.0", false, GrayscalePolicy::Ignore);
        let mut r = record("2.0.0.0");
        r.force = true;
        assert!(d.decide(&r, None).unwrap());
    }

    #[test]
    fn test_prompt_answer_decides() {
        let r = record("1.0.0.1");
        assert!(decider("1.0", true, GrayscalePolicy::Ignore).decide(&r, None).unwrap());
        assert!(!decider("1.0", false, GrayscalePolicy::Ignore).decide(&r, None).unwrap());
    }

    #[test]
    fn test_invalid_version_is_an_error() {
        let d = decider("1.0", true, GrayscalePolicy::Ignore);
        assert!(matches!(
            d.decide(&record("two"), None),
            Err(UpdateError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_ignore_policy_offers_to_everyone() {
        let d = decider("1.0", true, GrayscalePolicy::Ignore);
        let mut r = record("2.0");
        r.grayscale = "beta".into();
        assert!(d.decide(&r, Some("stable")).unwrap());
        assert!(d.decide(&r, None).unwrap());
    }

    #[test]
    fn test_restrict_policy_limits_audience() {
        let d = decider("1.0", true, GrayscalePolicy::Restrict);
        let mut r = record("2.0");
        r.grayscale = "beta,canary".into();
        r.force = true;
        assert!(!d.decide(&r, Some("stable")).unwrap());
        assert!(!d.decide(&r, None).unwrap());
        assert!(d.decide(&r, Some("canary")).unwrap());

        r.grayscale.clear();
        assert!(d.decide(&r, None).unwrap());
    }

    #[test]
    fn test_prompt_reflects_audience() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let confirm = move |p: &Prompt| -> Result<bool> {
            sink.lock().unwrap().push(p.clone());
            Ok(false)
        };
        let d = DefaultDecider::new(
            AppVersion::parse("1.0").unwrap(),
            Arc::new(confirm),
            GrayscalePolicy::Ignore,
        );

        let mut r = record("1.1");
        r.grayscale = "beta".into();
        r.changelog = "Faster startup".into();
        d.decide(&r, Some("beta")).unwrap();
        d.decide(&r, Some("stable")).unwrap();

        let prompts = seen.lock().unwrap();
        assert!(prompts[0].in_audience);
        assert!(!prompts[1].in_audience);
        assert_ne!(prompts[0].title(), prompts[1].title());
        assert!(prompts[0].body().contains("Faster startup"));
        assert!(prompts[0].body().contains("1.1.0.0"));
    }

    #[test]
    fn test_version_gate_property() {
        let current = AppVersion::parse("1.2.3.4").unwrap();
        let d = decider("1.2.3.4", true, GrayscalePolicy::Ignore);
        let samples = [
            "0", "1", "1.2", "1.2.3", "1.2.3.3", "1.2.3.4", "1.2.3.5", "1.2.4", "1.3", "2",
            "1.10", "1.2.10.0",
        ];
        for s in samples {
            let expected = AppVersion::parse(s).unwrap() > current;
            assert_eq!(d.decide(&record(s), None).unwrap(), expected, "version {s}");
        }
    }
}
