use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use servicecrm::{
    auth::{
        password::hash_password,
        permissions::{Role, ServicePermission},
    },
    config::AppConfig,
    db::{self, PgPool},
    models::{NewOrganization, NewUser},
    run_migrations,
    schema::{organizations, users},
    services::sla::sweep_escalations,
    utils::time::now,
};

const USAGE: &str = "Usage:
  maintenance create-organization <name> [--require-feedback] [--require-approval]
  maintenance create-user <organization-id> <username> <password> <role> [permission,...] [--super-admin]
  maintenance hash-password <password>
  maintenance sweep-escalations";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    match command.as_str() {
        "create-organization" => create_organization(rest)?,
        "create-user" => create_user(rest)?,
        "hash-password" => {
            let password = rest.first().context("hash-password needs a password")?;
            println!("{}", hash_password(password)?);
        }
        "sweep-escalations" => sweep()?,
        other => {
            eprintln!("Unknown command: {other}\n{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded servicecrm configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    run_migrations(&mut conn)?;
    Ok(pool)
}

fn create_organization(args: &[String]) -> Result<()> {
    let name = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .context("create-organization needs a name")?;
    let organization = NewOrganization {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        require_feedback_before_closure: args.iter().any(|arg| arg == "--require-feedback"),
        require_manager_approval: args.iter().any(|arg| arg == "--require-approval"),
    };

    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    diesel::insert_into(organizations::table)
        .values(&organization)
        .execute(&mut conn)
        .context("failed to insert organization")?;
    println!("{}", organization.id);
    Ok(())
}

fn create_user(args: &[String]) -> Result<()> {
    let positional: Vec<&String> = args.iter().filter(|arg| !arg.starts_with("--")).collect();
    let [organization_id, username, password, role, permissions @ ..] = positional.as_slice()
    else {
        bail!("create-user needs <organization-id> <username> <password> <role>");
    };

    let organization_id: Uuid = organization_id
        .parse()
        .context("organization id must be a UUID")?;
    let role: Role = role.parse()?;
    let mut service_permissions = Vec::new();
    for name in permissions.iter().flat_map(|list| list.split(',')) {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let permission: ServicePermission = name.parse()?;
        service_permissions.push(permission.as_str().to_string());
    }

    let user = NewUser {
        id: Uuid::new_v4(),
        organization_id,
        username: username.trim().to_string(),
        password_hash: hash_password(password)?,
        role: role.as_str().to_string(),
        is_super_admin: args.iter().any(|arg| arg == "--super-admin"),
        service_permissions,
    };

    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .context("failed to insert user")?;
    println!("{}", user.id);
    Ok(())
}

fn sweep() -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let escalated = sweep_escalations(&mut conn, None, now())?;
    println!("Escalated {} tickets.", escalated.len());
    for ticket_id in escalated {
        println!("  {ticket_id}");
    }
    Ok(())
}
