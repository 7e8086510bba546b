use clap::Parser;

/// All configuration is gathered interactively; see `~/.satellite-install.toml`
/// and the SATELLITE_* environment variables for installer settings.
#[derive(Parser, Debug)]
#[command(name = "satellite-install")]
#[command(
    about = "Provision and activate containerized monitoring satellites on a rootless Podman host",
    long_about = None
)]
#[command(version)]
pub struct Cli {}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rejects_arguments() {
        assert!(Cli::try_parse_from(["satellite-install", "--yes"]).is_err());
        assert!(Cli::try_parse_from(["satellite-install"]).is_ok());
    }
}
