use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use podsim::AddrRange;
use std::net::IpAddr;
use std::path::PathBuf;

/// Status patch rendered for every pod when no `--template` is given.
pub const DEFAULT_TEMPLATE: &str = r#"
status:
  phase: {{ .phase }}
  podIP: {{ .podIP }}
  podIPs:
  - ip: {{ .podIP }}
  hostIP: {{ .hostIP }}
  message: {{ quote .message }}
  conditions:
{{ range .conditions }}  - type: {{ . }}
    status: "True"
{{ end }}"#;

/// Runtime configuration for the `podsim-driver` binary.
///
/// All values are parsed from CLI arguments or environment variables, and a
/// `.env` file in the working directory is loaded first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "podsim-driver",
    version,
    about = "Reconciles a fleet of simulated pods through the podsim primitives"
)]
pub struct CliArgs {
    /// Number of simulated pods to reconcile.
    ///
    /// Environment variable: `OBJECTS`
    #[arg(long, env = "OBJECTS", default_value_t = 10_000)]
    pub objects: usize,

    /// Maximum number of concurrently running reconcile workers.
    ///
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `CAPACITY`
    #[arg(long, env = "CAPACITY")]
    pub capacity: Option<usize>,

    /// Address range pod IPs are allocated from, e.g. "10.0.0.1/16".
    ///
    /// Environment variable: `POD_CIDR`
    #[arg(long, env = "POD_CIDR", default_value_t = String::from("10.0.0.1/16"))]
    pub pod_cidr: String,

    /// Address reported as every pod's host IP.
    ///
    /// Environment variable: `HOST_IP`
    #[arg(long, env = "HOST_IP", default_value_t = String::from("196.168.0.1"))]
    pub host_ip: String,

    /// Path to a status patch template. The built-in template is used when
    /// unset.
    ///
    /// Environment variable: `TEMPLATE`
    #[arg(long, env = "TEMPLATE")]
    pub template: Option<PathBuf>,

    /// Simulated work per pod, in milliseconds.
    ///
    /// Environment variable: `WORK_MS`
    #[arg(long, env = "WORK_MS", default_value_t = 0)]
    pub work_ms: u64,

    /// Idle period after which a reconcile worker exits, in milliseconds.
    ///
    /// Environment variable: `IDLE_TIMEOUT_MS`
    #[arg(long, env = "IDLE_TIMEOUT_MS", default_value_t = 500)]
    pub idle_timeout_ms: u64,

    /// Release each pod's IP once its patch is rendered, as if the pod was
    /// deleted right away.
    #[arg(long, default_value_t = false)]
    pub churn: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub objects: usize,
    pub capacity: usize,
    pub pod_range: AddrRange,
    pub host_ip: IpAddr,
    pub template: String,
    pub work: Duration,
    pub idle_timeout: Duration,
    pub churn: bool,
}

impl TryFrom<CliArgs> for DriverConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.objects == 0 {
            bail!("OBJECTS must be greater than 0");
        }

        let capacity = args.capacity.unwrap_or_else(num_cpus::get);
        if capacity == 0 {
            bail!("CAPACITY must be greater than 0");
        }

        let pod_range: AddrRange = args.pod_cidr.parse()?;
        if !args.churn {
            let room = addresses_from_base(&pod_range);
            if room < args.objects as u128 {
                bail!(
                    "POD_CIDR {} has room for {} addresses but OBJECTS is {}",
                    pod_range,
                    room,
                    args.objects
                );
            }
        }

        let host_ip: IpAddr = args
            .host_ip
            .parse()
            .with_context(|| format!("HOST_IP {:?} is not an IP address", args.host_ip))?;

        let template = match &args.template {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading template {}", path.display()))?,
            None => DEFAULT_TEMPLATE.to_owned(),
        };

        Ok(Self {
            objects: args.objects,
            capacity,
            pod_range,
            host_ip,
            template,
            work: Duration::from_millis(args.work_ms),
            idle_timeout: Duration::from_millis(args.idle_timeout_ms),
            churn: args.churn,
        })
    }
}

/// Number of addresses between the range's base and the end of its network.
fn addresses_from_base(range: &AddrRange) -> u128 {
    let (bits, base, network) = match (range.base(), range.network()) {
        (IpAddr::V4(base), IpAddr::V4(network)) => {
            (32, u128::from(u32::from(base)), u128::from(u32::from(network)))
        }
        (IpAddr::V6(base), IpAddr::V6(network)) => (128, u128::from(base), u128::from(network)),
        _ => return 0,
    };
    let host_bits = bits - u32::from(range.prefix_len());
    // Only the low 64 bits are ever walked.
    let size = 1_u128 << host_bits.min(64);
    size.saturating_sub(base - network)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CliArgs {
        CliArgs::parse_from(["podsim-driver"])
    }

    #[test]
    fn defaults_are_valid() {
        let config = DriverConfig::try_from(args()).unwrap();
        assert_eq!(config.objects, 10_000);
        assert_eq!(config.pod_range.to_string(), "10.0.0.1/16");
        assert_eq!(config.idle_timeout, Duration::from_millis(500));
        assert!(config.capacity > 0);
        assert_eq!(config.template, DEFAULT_TEMPLATE);
    }

    #[test]
    fn rejects_zero_objects() {
        let args = CliArgs {
            objects: 0,
            ..args()
        };
        assert!(DriverConfig::try_from(args).is_err());
    }

    #[test]
    fn rejects_range_too_small() {
        let args = CliArgs {
            objects: 300,
            pod_cidr: "10.0.0.1/24".to_owned(),
            ..args()
        };
        assert!(DriverConfig::try_from(args.clone()).is_err());

        let churn = CliArgs { churn: true, ..args };
        assert!(DriverConfig::try_from(churn).is_ok());
    }

    #[test]
    fn counts_addresses_from_base() {
        let range: AddrRange = "10.0.0.1/24".parse().unwrap();
        assert_eq!(addresses_from_base(&range), 255);
        let range: AddrRange = "fd00::/64".parse().unwrap();
        assert_eq!(addresses_from_base(&range), 1 << 64);
    }

    #[test]
    fn rejects_bad_addresses() {
        let args = CliArgs {
            pod_cidr: "10.0.0.1".to_owned(),
            ..args()
        };
        assert!(DriverConfig::try_from(args).is_err());

        let args = CliArgs {
            host_ip: "host".to_owned(),
            ..self::args()
        };
        assert!(DriverConfig::try_from(args).is_err());
    }
}
