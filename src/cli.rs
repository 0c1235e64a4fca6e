use clap::{Parser, ValueEnum};

/// Discord bot serving cached game data with fuzzy lookup
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Services to run (defaults to all)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub services: Vec<ServiceName>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable output with colors
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ServiceName {
    /// Discord slash commands
    Bot,
    /// Periodic cache warming
    Warmer,
}

impl ServiceName {
    pub fn all() -> Vec<ServiceName> {
        vec![ServiceName::Bot, ServiceName::Warmer]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Bot => "bot",
            ServiceName::Warmer => "warmer",
        }
    }
}

impl Args {
    /// Requested services, or every service when none were named.
    pub fn enabled_services(&self) -> Vec<ServiceName> {
        if self.services.is_empty() {
            return ServiceName::all();
        }
        let mut services = Vec::with_capacity(self.services.len());
        for service in &self.services {
            if !services.contains(service) {
                services.push(*service);
            }
        }
        services
    }
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_default_to_all() {
        let args = Args::parse_from(["lorekeeper"]);
        assert_eq!(args.enabled_services(), ServiceName::all());
    }

    #[test]
    fn services_accept_comma_list() {
        let args = Args::parse_from(["lorekeeper", "--services", "warmer", "--tracing", "json"]);
        assert_eq!(args.enabled_services(), vec![ServiceName::Warmer]);
        assert!(matches!(args.tracing, TracingFormat::Json));
    }
}
