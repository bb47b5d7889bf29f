use clap::Parser;
use converge::backend::{BackendChoice, BootstrapWait, DeployOptions, RealBackend};
use converge::cli::{parse_duration_string, Cli, Commands, EnvCommands};
use converge::engine::{ensure_num_units, ConvergeOptions};
use converge::environment::{
    add_environment, default_registry_path, destroy_environment, EnvironmentConfig, Registry,
};
use converge::error::Error;
use converge::unit::unit_name;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        if let Some(err) = e.downcast_ref::<Error>() {
            eprintln!("Error: {}", err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let real = || RealBackend::new(&cli.environment).with_program(&cli.tool);

    match &cli.command {
        Commands::Status { json } => {
            let value = real().run_tool("status", &[])?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", serde_yaml::to_string(&value)?);
            }
        }

        Commands::Ensure {
            service,
            num_units,
            keep,
            terminate,
            grace,
        } => {
            let grace = parse_duration_string(grace)
                .ok_or_else(|| Error::Config(format!("invalid grace duration '{}'", grace)))?;
            let opts = ConvergeOptions {
                keep: keep.iter().copied().collect(),
                terminate: *terminate,
                grace,
            };
            let choice = if cli.simulate {
                BackendChoice::Simulated
            } else {
                BackendChoice::Real
            };
            let mut backend = choice.build(&cli.environment, &cli.tool);
            let destroyed = ensure_num_units(backend.as_mut(), service, *num_units, &opts)?;
            for (ordinal, unit) in &destroyed {
                println!("destroyed {}\t{}", unit_name(service, *ordinal), unit.state);
            }
        }

        Commands::Deploy {
            charm,
            service,
            num_units,
            config,
            constraints,
            local,
            repository,
            release,
            expose,
        } => {
            let backend = real();
            let opts = DeployOptions {
                config: config.clone(),
                constraints: constraints.clone(),
                local: *local,
                repository: repository.clone(),
                release: release.clone(),
            };
            backend.deploy(charm, service.as_deref(), *num_units, &opts)?;
            if *expose {
                backend.expose_service(service.as_deref().unwrap_or(charm))?;
            }
        }

        Commands::DestroyService { service } => {
            real().run_tool("destroy-service", &[service.clone()])?;
        }

        Commands::Bootstrap {
            wait,
            timeout,
            poll,
        } => {
            let wait = if *wait {
                let timeout = parse_duration_string(timeout)
                    .ok_or_else(|| Error::Config(format!("invalid timeout '{}'", timeout)))?;
                let poll = parse_duration_string(poll)
                    .ok_or_else(|| Error::Config(format!("invalid poll interval '{}'", poll)))?;
                Some(BootstrapWait { timeout, poll })
            } else {
                None
            };
            real().bootstrap(wait.as_ref())?;
            println!("Environment {} bootstrapped", cli.environment);
        }

        Commands::CleanupMachines => {
            let destroyed = real().cleanup_machines()?;
            if destroyed.is_empty() {
                println!("No idle machines");
            } else {
                for machine in destroyed {
                    println!("destroyed machine {}", machine);
                }
            }
        }

        Commands::Env(env_cmd) => run_env(&cli, env_cmd)?,
    }

    Ok(())
}

fn run_env(cli: &Cli, command: &EnvCommands) -> anyhow::Result<()> {
    let registry_path = default_registry_path();

    match command {
        EnvCommands::Add {
            name,
            provider,
            option,
        } => {
            let mut options = std::collections::BTreeMap::new();
            for pair in option {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    Error::Config(format!("invalid option '{}' (expected key=value)", pair))
                })?;
                options.insert(
                    key.to_string(),
                    serde_yaml::Value::String(value.to_string()),
                );
            }
            let config = EnvironmentConfig {
                provider: provider.clone(),
                options,
            };
            add_environment(&registry_path, name, config, |name| {
                RealBackend::new(name)
                    .with_program(&cli.tool)
                    .bootstrap(None)
            })?;
            println!("Environment {} added and bootstrapped", name);
        }

        EnvCommands::Destroy {
            name,
            remove,
            remove_default,
        } => {
            destroy_environment(&registry_path, name, *remove, *remove_default, |name| {
                RealBackend::new(name)
                    .with_program(&cli.tool)
                    .destroy_environment()
            })?;
            println!("Environment {} destroyed", name);
        }

        EnvCommands::List => {
            let registry = Registry::load(&registry_path)?;
            if registry.environments.is_empty() {
                println!("No environments registered");
            }
            for (name, config) in &registry.environments {
                let marker = if registry.default.as_deref() == Some(name.as_str()) {
                    " (default)"
                } else {
                    ""
                };
                println!("{}\t{}{}", name, config.provider, marker);
            }
        }
    }

    Ok(())
}
