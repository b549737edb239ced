//! Status handlers: are-you-there, temperature, IP

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::OnceLock;
use tracing::error;
use warden_shared::JobName;

use crate::cues::{BlinkPattern, Cue};
use crate::job::{JobContext, JobOutcome};
use crate::scripts;

const TEMPERATURE_FAILED: &str = "Unable to determine temperature.";

/// Handle ARE_YOU_THERE
pub async fn are_you_there(
    ctx: &JobContext,
    current: Option<JobName>,
    secure: bool,
) -> JobOutcome {
    ctx.cues.play(Cue::AreYouThere);

    let reading = read_temperature(ctx)
        .await
        .unwrap_or_else(|| TEMPERATURE_FAILED.to_string());

    let mut message = format!("Yes, I am. {reading}");
    if let Some(job) = current {
        message.push_str(&format!(" Currently executing: \"{job}\"."));
    }
    message.push_str(if secure {
        " Secure Status: ON."
    } else {
        " Secure Status: OFF."
    });

    JobOutcome::Completed { message }
}

/// Handle TEMPERATURE
pub async fn temperature(ctx: &JobContext) -> JobOutcome {
    ctx.cues.play(Cue::Temperature);
    let _blink = ctx.cues.blink(BlinkPattern::READING);

    match read_temperature(ctx).await {
        Some(message) => JobOutcome::Completed { message },
        None => JobOutcome::Failed {
            message: TEMPERATURE_FAILED.into(),
        },
    }
}

/// Handle IP
pub async fn ip(ctx: &JobContext) -> JobOutcome {
    let output = match ctx.scripts.run(scripts::SHOW_IP, &[]).await {
        Ok(output) => output,
        Err(e) => {
            error!("[JOB] IP lookup failed: {}", e);
            return JobOutcome::Failed {
                message: "Unable to determine IP addresses.".into(),
            };
        }
    };

    let addresses = parse_addresses(&output.stdout);
    if addresses.is_empty() {
        return JobOutcome::Failed {
            message: "Unable to determine IP addresses.".into(),
        };
    }

    JobOutcome::Completed {
        message: format!("Your IP addresses are: {}", addresses.join(", ")),
    }
}

async fn read_temperature(ctx: &JobContext) -> Option<String> {
    let output = ctx
        .scripts
        .run(scripts::SHOW_TEMP, &[])
        .await
        .map_err(|e| error!("[JOB] Temperature read failed: {}", e))
        .ok()?;

    let millidegrees = parse_millidegrees(&output.stdout)?;
    let celsius = millidegrees as f64 / 1000.0;
    let fahrenheit = celsius * 1.8 + 32.0;

    Some(format!(
        "Current ambient temperature is: {}°C/ {}°F.",
        round2(celsius),
        round2(fahrenheit)
    ))
}

/// Extract the `t=<millidegrees>` reading from probe output
fn parse_millidegrees(output: &str) -> Option<i64> {
    static READING: OnceLock<Regex> = OnceLock::new();
    let re = READING.get_or_init(|| Regex::new(r"[Tt]=(-?\d+)").expect("valid reading regex"));
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Non-loopback IPv4 addresses, in order of appearance
fn parse_addresses(output: &str) -> Vec<String> {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    let re = ADDRESS.get_or_init(|| {
        Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").expect("valid address regex")
    });

    let mut addresses: Vec<String> = Vec::new();
    for m in re.find_iter(output) {
        let Ok(addr) = m.as_str().parse::<Ipv4Addr>() else {
            continue;
        };
        if addr.is_loopback() || addr.is_unspecified() || addr.is_broadcast() {
            continue;
        }
        let addr = addr.to_string();
        if !addresses.contains(&addr) {
            addresses.push(addr);
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::test_support::harness;

    #[test]
    fn test_parse_millidegrees() {
        assert_eq!(parse_millidegrees("72 01 4b 46 : crc=1f YES\nt=23125"), Some(23125));
        assert_eq!(parse_millidegrees("T=-1500"), Some(-1500));
        assert_eq!(parse_millidegrees("no reading"), None);
    }

    #[test]
    fn test_parse_addresses_skips_loopback() {
        let output = "lo 127.0.0.1\neth0 192.168.1.20\nwlan0 10.0.0.7 999.1.1.1\neth0 192.168.1.20";
        assert_eq!(parse_addresses(output), vec!["192.168.1.20", "10.0.0.7"]);
    }

    #[tokio::test]
    async fn test_temperature_message() {
        let h = harness();
        h.scripts.respond(scripts::SHOW_TEMP, "crc=1f YES\nt=21562\n");

        let outcome = temperature(&h.ctx).await;
        assert_eq!(
            outcome,
            JobOutcome::Completed {
                message: "Current ambient temperature is: 21.56°C/ 70.81°F.".into()
            }
        );
    }

    #[tokio::test]
    async fn test_temperature_failure() {
        let h = harness();
        h.scripts.fail(scripts::SHOW_TEMP);

        let outcome = temperature(&h.ctx).await;
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                message: TEMPERATURE_FAILED.into()
            }
        );
    }

    #[tokio::test]
    async fn test_are_you_there_reports_current_job_and_secure() {
        let h = harness();
        h.scripts.respond(scripts::SHOW_TEMP, "t=20000");

        let outcome = are_you_there(&h.ctx, Some(JobName::SweepRoom), true).await;
        assert_eq!(
            outcome.message(),
            Some(
                "Yes, I am. Current ambient temperature is: 20°C/ 68°F. \
                 Currently executing: \"Sweep Room\". Secure Status: ON."
            )
        );
    }

    #[tokio::test]
    async fn test_ip_without_addresses_fails() {
        let h = harness();
        h.scripts.respond(scripts::SHOW_IP, "127.0.0.1\n");

        let outcome = ip(&h.ctx).await;
        assert!(matches!(outcome, JobOutcome::Failed { .. }));
    }
}
