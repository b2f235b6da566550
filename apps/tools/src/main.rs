use std::{collections::BTreeSet, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use gateway::{HttpGateway, NewsletterApi};
use shared::domain::Profile;
use url::Url;
use workflow::{
    flows::optin,
    permissions::permission_definitions,
    settings::WorkflowSettings,
    tree::build_tree,
    WorkflowContext,
};

/// Operator commands against a CiviCRM newsletter backend.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "http://localhost/civicrm/extern/rest.php")]
    endpoint: Url,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    site_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the configured profiles.
    Profiles,
    /// Print the access permissions generated for every profile.
    Permissions,
    /// Print a profile's mailing-list tree as the forms would render it.
    Tree {
        profile: String,
        #[arg(long)]
        parent_groups_selectable: bool,
    },
    /// Confirm pending subscriptions for the contact behind a checksum.
    Optin { profile: String, checksum: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let cli = Cli::parse();
    let gateway = HttpGateway::new(cli.endpoint).with_credentials(cli.api_key, cli.site_key);
    let api = NewsletterApi::new(Arc::new(gateway));

    match cli.command {
        Command::Profiles => {
            for profile in api.profiles().await? {
                println!("{}\t{}", profile.name, profile.form_title);
            }
        }
        Command::Permissions => {
            let profiles = api.profiles().await?;
            let names = profiles.iter().map(|profile| profile.name.as_str());
            for definition in permission_definitions(names) {
                println!("{}\t{}", definition.name, definition.title);
            }
        }
        Command::Tree {
            profile,
            parent_groups_selectable,
        } => {
            let profile = require_profile(&api, &profile).await?;
            let tree = build_tree(
                &profile.mailing_lists_tree,
                &BTreeSet::new(),
                parent_groups_selectable,
            );
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Command::Optin { profile, checksum } => {
            let profile = require_profile(&api, &profile).await?;
            let ctx = WorkflowContext::new(api, WorkflowSettings::default());
            let outcome = optin::run(&ctx, &profile, &checksum).await;
            for message in &outcome.messages {
                println!("{:?}: {}", message.level, message.text);
            }
        }
    }

    Ok(())
}

async fn require_profile(api: &NewsletterApi, name: &str) -> Result<Profile> {
    match api.profile(name).await? {
        Some(profile) => Ok(profile),
        None => bail!("newsletter profile '{name}' not found"),
    }
}
