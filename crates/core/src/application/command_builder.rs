// Analyzer command construction
//
// Pure translation of probe + stream + profile into a discrete argument
// vector. No shell is involved, so addresses and options are never
// re-tokenized.

use crate::domain::{OutputFormat, Probe, ProfileCatalog, Stream, TransportType};

/// How the analyzer executable is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerInvocation {
    pub program: String,
    pub prefix_args: Vec<String>,
}

impl AnalyzerInvocation {
    /// Run the analyzer binary directly
    pub fn direct(executable: impl Into<String>) -> Self {
        Self {
            program: executable.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Run the analyzer inside an already running container
    ///
    /// Produces `docker exec -i <container> tsp`.
    pub fn container(container: impl Into<String>) -> Self {
        Self {
            program: "docker".to_string(),
            prefix_args: vec![
                "exec".to_string(),
                "-i".to_string(),
                container.into(),
                "tsp".to_string(),
            ],
        }
    }

    /// Program followed by prefix arguments
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + self.prefix_args.len());
        argv.push(self.program.clone());
        argv.extend(self.prefix_args.iter().cloned());
        argv
    }
}

/// Builds analyzer argument vectors
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    invocation: AnalyzerInvocation,
    default_options: Vec<String>,
    profiles: ProfileCatalog,
}

impl CommandBuilder {
    pub fn new(
        invocation: AnalyzerInvocation,
        default_options: Vec<String>,
        profiles: ProfileCatalog,
    ) -> Self {
        Self {
            invocation,
            default_options,
            profiles,
        }
    }

    pub fn invocation(&self) -> &AnalyzerInvocation {
        &self.invocation
    }

    /// Probe override, else profile default, else text
    pub fn effective_output_format(&self, probe: &Probe) -> OutputFormat {
        probe
            .output_format
            .or_else(|| {
                self.profiles
                    .resolve(&probe.profile)
                    .and_then(|p| p.output_format)
            })
            .unwrap_or_default()
    }

    /// Build the full argument vector; element 0 is the program
    ///
    /// Order: invocation prefix, default options, input plugin, profile
    /// plugins, json flag, probe options, discard output plugin.
    pub fn build(&self, probe: &Probe, stream: &Stream) -> Vec<String> {
        let mut argv = self.invocation.to_argv();

        argv.extend(self.default_options.iter().cloned());

        argv.push("-I".to_string());
        argv.push("ip".to_string());
        if stream.transport == TransportType::Rtp {
            argv.push("--rtp".to_string());
        }
        argv.push(stream.endpoint());

        // Unknown profile: no analysis plugins
        if let Some(profile) = self.profiles.resolve(&probe.profile) {
            for plugin in &profile.plugins {
                argv.push("-P".to_string());
                argv.push(plugin.name.clone());
                argv.extend(plugin.options.iter().cloned());
            }
        }

        if self.effective_output_format(probe) == OutputFormat::Json {
            argv.push("--json".to_string());
        }

        argv.extend(probe.options.iter().cloned());

        argv.push("-O".to_string());
        argv.push("drop".to_string());

        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_stream(address: Option<&str>, port: u16) -> Stream {
        Stream {
            id: 1,
            name: "mux".to_string(),
            transport: TransportType::Udp,
            address: address.map(|a| a.to_string()),
            port,
            options: serde_json::json!({}),
        }
    }

    fn builder() -> CommandBuilder {
        CommandBuilder::new(
            AnalyzerInvocation::direct("/usr/bin/tsp"),
            vec![],
            ProfileCatalog::builtin(),
        )
    }

    #[test]
    fn test_udp_input_clause() {
        let probe = Probe::new(1, "p", 1, "basic");
        let argv = builder().build(&probe, &udp_stream(Some("239.1.1.1"), 1234));

        assert_eq!(argv[0], "/usr/bin/tsp");
        let input = argv.iter().position(|a| a == "-I").unwrap();
        assert_eq!(&argv[input..input + 3], &["-I", "ip", "239.1.1.1:1234"]);
    }

    #[test]
    fn test_rtp_without_address_uses_bare_port() {
        let probe = Probe::new(1, "p", 1, "basic");
        let mut stream = udp_stream(None, 5000);
        stream.transport = TransportType::Rtp;

        let argv = builder().build(&probe, &stream);
        let input = argv.iter().position(|a| a == "-I").unwrap();
        assert_eq!(&argv[input..input + 4], &["-I", "ip", "--rtp", "5000"]);
    }

    #[test]
    fn test_full_order() {
        let mut probe = Probe::new(1, "p", 1, "basic");
        probe.output_format = Some(OutputFormat::Json);
        probe.options = vec!["--verbose".to_string(), "--buffer-size-mb".to_string(), "4".to_string()];

        let builder = CommandBuilder::new(
            AnalyzerInvocation::container("tsduck"),
            vec!["--realtime".to_string()],
            ProfileCatalog::builtin(),
        );
        let argv = builder.build(&probe, &udp_stream(Some("239.1.1.1"), 1234));

        let expected: Vec<&str> = vec![
            "docker", "exec", "-i", "tsduck", "tsp",
            "--realtime",
            "-I", "ip", "239.1.1.1:1234",
            "-P", "until", "-s", "2",
            "-P", "analyze",
            "--json",
            "--verbose", "--buffer-size-mb", "4",
            "-O", "drop",
        ];
        assert_eq!(argv, expected);
    }

    #[test]
    fn test_profile_default_format_applies() {
        let probe = Probe::new(1, "p", 1, "monitoring");
        let b = builder();
        assert_eq!(b.effective_output_format(&probe), OutputFormat::Json);
        assert!(b.build(&probe, &udp_stream(None, 1234)).contains(&"--json".to_string()));
    }

    #[test]
    fn test_probe_override_wins_over_profile() {
        let mut probe = Probe::new(1, "p", 1, "monitoring");
        probe.output_format = Some(OutputFormat::Text);
        let argv = builder().build(&probe, &udp_stream(None, 1234));
        assert!(!argv.contains(&"--json".to_string()));
    }

    #[test]
    fn test_unknown_profile_has_no_plugins() {
        let probe = Probe::new(1, "p", 1, "does-not-exist");
        let argv = builder().build(&probe, &udp_stream(Some("10.0.0.1"), 1234));

        assert!(!argv.contains(&"-P".to_string()));
        assert_eq!(&argv[argv.len() - 2..], &["-O", "drop"]);
    }

    #[test]
    fn test_options_are_not_split() {
        let mut probe = Probe::new(1, "p", 1, "basic");
        probe.options = vec!["--label; rm -rf /".to_string()];
        let argv = builder().build(&probe, &udp_stream(None, 1234));
        assert!(argv.contains(&"--label; rm -rf /".to_string()));
    }
}
