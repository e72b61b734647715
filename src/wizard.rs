//! Interactive collection of an [`InstallationConfig`].
//!
//! Account, timezone, mirror, desktop and extra packages are asked first,
//! storage last, then a summary is shown and the destructive step confirmed.

use crate::config_file::{
    validate_hostname, validate_password, validate_username, InstallationConfig, UserRecord, DEFAULT_REPO,
};
use crate::disk::model::Disk;
use crate::editor::configure_storage;
use crate::editor::prompt::{choose, MenuOption, Prompter};
use crate::editor::session::status_table;
use crate::error::{InstallerError, Result};
use crate::hardware::FirmwareMode;
use crate::types::DesktopEnvironment;
use tracing::info;

const OTHER_TIMEZONE: &str = "Other (type it)";

/// Offered timezones as (label, IANA name).
pub const TIMEZONES: &[(&str, &str)] = &[
    ("UTC", "Etc/UTC"),
    ("São Paulo (SP, RJ, MG, ES, DF)", "America/Sao_Paulo"),
    ("Bahia", "America/Bahia"),
    ("Fortaleza (CE, RN, PB, PI)", "America/Fortaleza"),
    ("Recife (PE, AL)", "America/Recife"),
    ("Belém (PA, AP)", "America/Belem"),
    ("Manaus (AM)", "America/Manaus"),
    ("Cuiabá (MT)", "America/Cuiaba"),
    ("Campo Grande (MS)", "America/Campo_Grande"),
    ("Porto Velho (RO)", "America/Porto_Velho"),
    ("Rio Branco (AC)", "America/Rio_Branco"),
    ("Fernando de Noronha", "America/Noronha"),
    ("Lisbon", "Europe/Lisbon"),
    ("New York", "America/New_York"),
];

/// Apt mirrors as (label, URL).
pub const MIRRORS: &[(&str, &str)] = &[
    ("Global (archive.ubuntu.com)", DEFAULT_REPO),
    ("Brazil (br.archive.ubuntu.com)", "http://br.archive.ubuntu.com/ubuntu/"),
    ("USP - São Paulo", "http://sft.if.usp.br/ubuntu/"),
    ("UFSCar - São Carlos", "http://mirror.ufscar.br/ubuntu/"),
    ("LetsCloud - São Paulo", "https://ubuntu.mirror.letscloud.io/"),
];

fn non_empty(input: &str) -> std::result::Result<(), String> {
    if input.trim().is_empty() {
        Err("a value is required".to_string())
    } else {
        Ok(())
    }
}

/// Full name, hostname and login, confirmed together, then a password
/// entered twice.
pub fn ask_user(prompter: &mut dyn Prompter) -> Result<UserRecord> {
    let (name, hostname, username) = loop {
        let name = prompter.text("Your full name", &non_empty)?.trim().to_string();
        let hostname = prompter
            .text("Computer name (hostname)", &|s: &str| validate_hostname(s.trim()))?
            .trim()
            .to_lowercase();
        let username = prompter
            .text("Login name", &|s: &str| validate_username(s.trim()))?
            .trim()
            .to_string();

        let message = format!("Name: {}  User: {}  Computer: {}. Correct?", name, username, hostname);
        if prompter.confirm(&message, true)? {
            break (name, hostname, username);
        }
    };

    let password = loop {
        let password = prompter.secret("Password")?;
        let again = prompter.secret("Repeat the password")?;
        if let Err(reason) = validate_password(&password) {
            prompter.notify(&reason);
            continue;
        }
        if password != again {
            prompter.notify("The passwords do not match, try again");
            continue;
        }
        break password;
    };

    Ok(UserRecord {
        name,
        hostname,
        username,
        password,
    })
}

pub fn ask_timezone(prompter: &mut dyn Prompter) -> Result<String> {
    let mut options: Vec<MenuOption<Option<&str>>> = TIMEZONES
        .iter()
        .map(|(label, zone)| MenuOption::new(format!("{} ({})", label, zone), Some(*zone)))
        .collect();
    options.push(MenuOption::new(OTHER_TIMEZONE, None));

    match choose(prompter, "Timezone", &options)? {
        Some(zone) => Ok(zone.to_string()),
        None => prompter
            .text("Timezone (Area/City, e.g. Europe/Berlin)", &|s: &str| {
                let s = s.trim();
                if s.contains('/') && !s.contains("..") && !s.starts_with('/') && !s.contains(' ') {
                    Ok(())
                } else {
                    Err("use the Area/City form".to_string())
                }
            })
            .map(|s| s.trim().to_string()),
    }
}

pub fn ask_repo(prompter: &mut dyn Prompter) -> Result<String> {
    let options: Vec<MenuOption<&str>> = MIRRORS
        .iter()
        .map(|(label, url)| MenuOption::new(*label, *url))
        .collect();
    choose(prompter, "Package mirror", &options).map(str::to_string)
}

/// `None` when no graphical desktop is wanted.
pub fn ask_desktop(prompter: &mut dyn Prompter) -> Result<Option<DesktopEnvironment>> {
    if !prompter.confirm("Install a graphical desktop?", true)? {
        return Ok(None);
    }
    let options = [
        MenuOption::new("GNOME Shell", DesktopEnvironment::Gnome),
        MenuOption::new("Cinnamon", DesktopEnvironment::Cinnamon),
        MenuOption::new("KDE Plasma", DesktopEnvironment::Kde),
        MenuOption::new("Xfce", DesktopEnvironment::Xfce),
    ];
    choose(prompter, "Desktop environment", &options).map(Some)
}

/// Space or comma separated apt package names.
pub fn parse_package_list(input: &str) -> std::result::Result<Vec<String>, String> {
    let packages: Vec<String> = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(bad) = packages.iter().find(|p| {
        !p.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c))
    }) {
        return Err(format!("'{}' is not a valid package name", bad));
    }
    Ok(packages)
}

pub fn ask_apps(prompter: &mut dyn Prompter) -> Result<Vec<String>> {
    let raw = prompter.text("Extra packages (space separated, empty for none)", &|s: &str| {
        parse_package_list(s).map(|_| ())
    })?;
    parse_package_list(&raw).map_err(InstallerError::prompt)
}

/// Human-readable overview shown before the final confirmation.
pub fn summary(config: &InstallationConfig, firmware: FirmwareMode) -> String {
    let mut out = String::new();
    out.push_str(&format!("Name: {}\n", config.user.name));
    out.push_str(&format!("User: {}\n", config.user.username));
    out.push_str(&format!("Computer: {}\n", config.user.hostname));
    out.push_str(&format!(
        "Timezone: {}\n",
        config.timezone.as_deref().unwrap_or("(unchanged)")
    ));
    out.push_str(&format!("Mirror: {}\n", config.primary_repo()));
    out.push_str(&format!(
        "Desktop: {}\n",
        config
            .desktop
            .map(|d| d.to_string())
            .unwrap_or_else(|| "none".to_string())
    ));
    if !config.apps.is_empty() {
        out.push_str(&format!("Packages: {}\n", config.apps.join(" ")));
    }
    out.push_str(&format!("Firmware: {}\n", firmware));
    for disk in &config.disks {
        out.push_str(&format!("\n{}{}\n", disk.name, if disk.wipe { " (wiped)" } else { "" }));
        out.push_str(&status_table(disk));
        out.push('\n');
    }
    out
}

/// Ask everything and return the configuration the user accepted.
///
/// Declining the final confirmation is reported as [`InstallerError::UserAborted`].
pub fn run_wizard(
    prompter: &mut dyn Prompter,
    firmware: FirmwareMode,
    inventory: &[Disk],
) -> Result<InstallationConfig> {
    let user = ask_user(prompter)?;
    let timezone = ask_timezone(prompter)?;
    let repo = ask_repo(prompter)?;
    let desktop = ask_desktop(prompter)?;
    let apps = ask_apps(prompter)?;
    let disks: Vec<Disk> = configure_storage(prompter, firmware, inventory)?;

    let config = InstallationConfig {
        user,
        disks,
        timezone: Some(timezone),
        repos: vec![repo],
        apps,
        desktop,
        ..InstallationConfig::default()
    };

    prompter.notify(&summary(&config, firmware));
    if !prompter.confirm("Start the installation? Selected partitions will be erased", false)? {
        return Err(InstallerError::UserAborted);
    }
    info!(user = %config.user.username, disks = config.disks.len(), "wizard finished");
    Ok(config)
}
