//! The directive registry.
//!
//! `Directive::lookup` maps a lower-cased keyword to its handler; `apply`
//! validates the arguments and updates the `ConfigState`. A handler returns
//! the number of errors it found in its line and leaves the state untouched
//! when it rejects the directive.

use std::path::Path;

use indexmap::IndexSet;

use crate::group::{expand_grouplist, spellcheck};
use crate::loader::ConfigLoader;
use crate::node::{parse_specifiers, split_specifiers, NodeDefinition};
use crate::state::{Params, RESERVED_GROUPS};
use crate::symbol::{Origin, SymbolTable};

/// Output roles that accept a `color_<role>` directive.
pub const COLOR_ROLES: [&str; 17] = [
    "info", "warn", "error", "fail", "sync", "link", "mkdir", "rm", "chown", "chmod", "exec",
    "upload", "new", "type", "dryrun", "fixing", "ok",
];

/// Base for integer directives.
const INTEGER_RADIX: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Include,
    Prefix,
    Tempdir,
    PackageManager,
    NumProc,
    Boolean(BoolParam),
    Color(&'static str),
    Command(CommandParam),
    Ignore,
    DefaultNodeset,
    Group,
    Master,
    Slave,
    Node,
    IgnoreNode,
    IgnoreGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolParam {
    RequireExtension,
    FullPath,
    BackupCopies,
    Syslogging,
    IgnoreDotfiles,
    IgnoreDotdirs,
    Terse,
    Colorize,
    ColorizeFullLine,
    ColorizeBright,
    ColorizeBold,
}

impl BoolParam {
    /// Symbol the directive is registered under.
    fn symbol(self) -> &'static str {
        match self {
            Self::RequireExtension => "require_extension",
            Self::FullPath => "full_path",
            Self::BackupCopies => "backup_copies",
            Self::Syslogging => "syslogging",
            Self::IgnoreDotfiles => "ignore_dotfiles",
            Self::IgnoreDotdirs => "ignore_dotdirs",
            Self::Terse => "terse",
            Self::Colorize => "colorize",
            Self::ColorizeFullLine => "colorize_full_line",
            Self::ColorizeBright => "colorize_bright",
            Self::ColorizeBold => "colorize_bold",
        }
    }

    fn slot(self, params: &mut Params) -> &mut bool {
        match self {
            Self::RequireExtension => &mut params.require_extension,
            Self::FullPath => &mut params.full_path,
            Self::BackupCopies => &mut params.backup_copies,
            Self::Syslogging => &mut params.syslogging,
            Self::IgnoreDotfiles => &mut params.ignore_dotfiles,
            Self::IgnoreDotdirs => &mut params.ignore_dotdirs,
            Self::Terse => &mut params.terse,
            Self::Colorize => &mut params.colorize,
            Self::ColorizeFullLine => &mut params.colorize_full_line,
            Self::ColorizeBright | Self::ColorizeBold => &mut params.colorize_bright,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandParam {
    Diff,
    Ping,
    Ssh,
    Scp,
    Rsync,
    Synctool,
    Pkg,
}

impl CommandParam {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Diff => "diff_cmd",
            Self::Ping => "ping_cmd",
            Self::Ssh => "ssh_cmd",
            Self::Scp => "scp_cmd",
            Self::Rsync => "rsync_cmd",
            Self::Synctool => "synctool_cmd",
            Self::Pkg => "pkg_cmd",
        }
    }

    /// The program the setting is expected to name, for messages.
    fn program(self) -> &'static str {
        match self {
            Self::Diff => "diff",
            Self::Ping => "ping",
            Self::Ssh => "ssh",
            Self::Scp => "scp",
            Self::Rsync => "rsync",
            Self::Synctool => "synctool-client",
            Self::Pkg => "synctool-client-pkg",
        }
    }

    fn slot(self, params: &mut Params) -> &mut String {
        match self {
            Self::Diff => &mut params.diff_cmd,
            Self::Ping => &mut params.ping_cmd,
            Self::Ssh => &mut params.ssh_cmd,
            Self::Scp => &mut params.scp_cmd,
            Self::Rsync => &mut params.rsync_cmd,
            Self::Synctool => &mut params.synctool_cmd,
            Self::Pkg => &mut params.pkg_cmd,
        }
    }
}

impl Directive {
    pub fn lookup(keyword: &str) -> Option<Self> {
        use BoolParam::*;
        use CommandParam::*;

        let directive = match keyword {
            "include" => Self::Include,
            "prefix" => Self::Prefix,
            "tempdir" => Self::Tempdir,
            "package_manager" => Self::PackageManager,
            "num_proc" => Self::NumProc,
            "require_extension" => Self::Boolean(RequireExtension),
            "full_path" => Self::Boolean(FullPath),
            "backup_copies" => Self::Boolean(BackupCopies),
            "syslogging" => Self::Boolean(Syslogging),
            "ignore_dotfiles" => Self::Boolean(IgnoreDotfiles),
            "ignore_dotdirs" => Self::Boolean(IgnoreDotdirs),
            "terse" => Self::Boolean(Terse),
            "colorize" => Self::Boolean(Colorize),
            "colorize_full_line" | "colorize_full_lines" => Self::Boolean(ColorizeFullLine),
            "colorize_bright" => Self::Boolean(ColorizeBright),
            "colorize_bold" => Self::Boolean(ColorizeBold),
            "diff_cmd" => Self::Command(Diff),
            "ping_cmd" => Self::Command(Ping),
            "ssh_cmd" => Self::Command(Ssh),
            "scp_cmd" => Self::Command(Scp),
            "rsync_cmd" => Self::Command(Rsync),
            "synctool_cmd" => Self::Command(Synctool),
            "pkg_cmd" => Self::Command(Pkg),
            "ignore" => Self::Ignore,
            "default_nodeset" => Self::DefaultNodeset,
            "group" => Self::Group,
            "master" => Self::Master,
            "slave" => Self::Slave,
            "node" => Self::Node,
            "ignore_node" => Self::IgnoreNode,
            "ignore_group" => Self::IgnoreGroup,
            _ => {
                let role = keyword.strip_prefix("color_")?;
                return COLOR_ROLES
                    .into_iter()
                    .find(|known| *known == role)
                    .map(Self::Color);
            }
        };
        Some(directive)
    }

    /// Applies the directive. `args[0]` is the keyword itself.
    pub fn apply(self, loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
        match self {
            Self::Include => {
                let path = prepare_path(&args[1], &loader.state().params.prefix);
                loader.include(Path::new(&path), origin)
            }
            Self::Prefix => config_prefix(loader, args, origin),
            Self::Tempdir => config_tempdir(loader, args, origin),
            Self::PackageManager => config_package_manager(loader, args, origin),
            Self::NumProc => config_num_proc(loader, args, origin),
            Self::Boolean(param) => config_boolean(loader, param, &args[1], origin),
            Self::Color(role) => config_color(loader, role, &args[1], origin),
            Self::Command(param) => config_command(loader, param, args, origin),
            Self::Ignore => config_ignore(loader, args),
            Self::DefaultNodeset => config_default_nodeset(loader, args, origin),
            Self::Group => config_group(loader, args, origin),
            Self::Master => config_master(loader, args, origin),
            Self::Slave => config_slave(loader, args, origin),
            Self::Node => config_node(loader, args, origin),
            Self::IgnoreNode => config_ignore_names(loader, args, origin, false),
            Self::IgnoreGroup => config_ignore_names(loader, args, origin, true),
        }
    }
}

/// Reports a redefinition of `key`, if any. `Err` carries the error count.
fn check_definition(loader: &mut ConfigLoader, key: &str, origin: &Origin) -> Result<(), usize> {
    match loader.state().symbols.check(key) {
        Ok(()) => Ok(()),
        Err(err) => Err(loader.redefinition(origin, err)),
    }
}

fn define(loader: &mut ConfigLoader, key: &str, origin: &Origin) {
    // Callers ran `check_definition` first, so this cannot collide.
    let defined = loader.state_mut().symbols.define(key, origin);
    debug_assert!(defined.is_ok(), "{} defined twice", key);
}

fn config_boolean(
    loader: &mut ConfigLoader,
    param: BoolParam,
    value: &str,
    origin: &Origin,
) -> usize {
    let key = param.symbol();
    if let Err(errors) = check_definition(loader, key, origin) {
        return errors;
    }

    let value = value.to_lowercase();
    let defaults = &loader.state().defaults;
    let parsed = if defaults.boolean_true.contains(value.as_str()) {
        true
    } else if defaults.boolean_false.contains(value.as_str()) {
        false
    } else {
        return loader.error(origin, format!("invalid argument for {}", key));
    };

    define(loader, key, origin);
    *param.slot(&mut loader.state_mut().params) = parsed;
    0
}

fn parse_integer(value: &str, radix: u32) -> Option<i64> {
    i64::from_str_radix(value, radix).ok()
}

fn config_num_proc(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if let Err(errors) = check_definition(loader, "num_proc", origin) {
        return errors;
    }
    match parse_integer(&args[1], INTEGER_RADIX) {
        Some(n) if n >= 1 => {
            define(loader, "num_proc", origin);
            loader.state_mut().params.num_proc = n as usize;
            0
        }
        _ => loader.error(origin, "invalid argument for num_proc"),
    }
}

fn config_color(loader: &mut ConfigLoader, role: &str, value: &str, origin: &Origin) -> usize {
    let key = format!("color_{}", role);
    if let Err(errors) = check_definition(loader, &key, origin) {
        return errors;
    }

    let value = value.to_lowercase();
    if !loader.state().defaults.color_names.contains(value.as_str()) {
        return loader.error(origin, format!("invalid argument for {}", key));
    }
    define(loader, &key, origin);
    loader
        .state_mut()
        .params
        .colors
        .insert(role.to_string(), value);
    0
}

fn config_command(
    loader: &mut ConfigLoader,
    param: CommandParam,
    args: &[String],
    origin: &Origin,
) -> usize {
    let key = param.symbol();
    if let Err(errors) = check_definition(loader, key, origin) {
        return errors;
    }
    if args.len() < 2 {
        return loader.error(
            origin,
            format!(
                "'{}' requires an argument: the '{}' command, and any appropriate switches",
                key,
                param.program()
            ),
        );
    }

    // Whether the program exists is checked by whoever runs it.
    let command = prepare_path(&args[1..].join(" "), &loader.state().params.prefix);
    define(loader, key, origin);
    *param.slot(&mut loader.state_mut().params) = command;
    0
}

fn config_prefix(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if let Err(errors) = check_definition(loader, "prefix", origin) {
        return errors;
    }

    let dir = strip_multiple_slashes(&args[1..].join(" "));
    let dir = match dir.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    };
    if !Path::new(&dir).is_dir() {
        return loader.error(origin, "no such directory for prefix");
    }
    define(loader, "prefix", origin);
    loader.state_mut().params.prefix = dir;
    0
}

fn config_tempdir(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if let Err(errors) = check_definition(loader, "tempdir", origin) {
        return errors;
    }

    let dir = prepare_path(&args[1..].join(" "), &loader.state().params.prefix);
    if !Path::new(&dir).is_absolute() {
        return loader.error(origin, "tempdir must be an absolute path");
    }
    define(loader, "tempdir", origin);
    loader.state_mut().params.tempdir = dir;
    0
}

fn config_package_manager(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if let Err(errors) = check_definition(loader, "package_manager", origin) {
        return errors;
    }

    let manager = &args[1];
    if !loader
        .state()
        .defaults
        .package_managers
        .contains(manager.as_str())
    {
        return loader.error(
            origin,
            format!("unknown or unsupported package manager '{}'", manager),
        );
    }
    define(loader, "package_manager", origin);
    loader.state_mut().params.package_manager = Some(manager.clone());
    0
}

fn config_ignore(loader: &mut ConfigLoader, args: &[String]) -> usize {
    let params = &mut loader.state_mut().params;
    for pattern in &args[1..] {
        let wildcard = pattern.contains('*')
            || pattern.contains('?')
            || (pattern.contains('[') && pattern.contains(']'));
        if !wildcard {
            params.ignore_files.insert(pattern.clone());
        } else if !params.ignore_files_with_wildcards.contains(pattern) {
            params.ignore_files_with_wildcards.push(pattern.clone());
        }
    }
    0
}

fn config_default_nodeset(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if let Err(errors) = check_definition(loader, "default_nodeset", origin) {
        return errors;
    }

    let mut nodeset = IndexSet::new();
    for name in &args[1..] {
        if !spellcheck(name) {
            return loader.error(origin, format!("invalid name '{}'", name));
        }
        if name == "none" {
            nodeset.clear();
        } else {
            nodeset.insert(name.clone());
        }
    }

    // Names are checked against the nodes and groups once loading is done.
    define(loader, "default_nodeset", origin);
    loader.state_mut().params.default_nodeset = nodeset;
    0
}

fn config_group(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if args.len() < 3 {
        return loader.error(
            origin,
            "'group' requires at least 2 arguments: \
             the compound group name and at least 1 member group",
        );
    }

    let group = &args[1];
    if !spellcheck(group) {
        return loader.error(origin, format!("invalid group name '{}'", group));
    }
    if RESERVED_GROUPS.contains(&group.as_str()) {
        return loader.error(
            origin,
            format!("implicit group '{}' can not be redefined", group),
        );
    }

    let key = SymbolTable::group_key(group);
    if let Err(errors) = check_definition(loader, &key, origin) {
        return errors;
    }
    if let Some(node_origin) = loader.state().symbols.get(&SymbolTable::node_key(group)) {
        let note = format!("{}: previous definition was here", node_origin);
        let message = format!("{} was previously defined as a node", group);
        return loader.error_with_note(origin, message, note);
    }
    if let Some(member) = args[2..].iter().find(|m| !spellcheck(m)) {
        return loader.error(origin, format!("invalid group name '{}'", member));
    }

    match expand_grouplist(loader.state_mut(), &args[2..]) {
        Ok(members) => {
            define(loader, &key, origin);
            loader.state_mut().groups.insert(group.clone(), members);
            0
        }
        Err(err) => {
            tracing::debug!("{}: {}", origin, err);
            loader.error(origin, "compound groups can not contain node names")
        }
    }
}

fn config_master(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if args.len() != 2 {
        return loader.error(origin, "'master' requires one argument: a nodename");
    }
    let node = &args[1];
    if !spellcheck(node) {
        return loader.error(origin, format!("invalid node name '{}'", node));
    }
    if let Err(errors) = check_definition(loader, "master", origin) {
        return errors;
    }

    // Whether it names a real node is checked once loading is done.
    define(loader, "master", origin);
    loader.state_mut().params.master = Some(node.clone());
    0
}

fn config_slave(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    if let Some(node) = args[1..].iter().find(|n| !spellcheck(n)) {
        return loader.error(origin, format!("invalid node name '{}'", node));
    }
    loader
        .state_mut()
        .params
        .slaves
        .extend(args[1..].iter().cloned());
    0
}

fn config_node(loader: &mut ConfigLoader, args: &[String], origin: &Origin) -> usize {
    let node = &args[1];
    if !spellcheck(node) {
        return loader.error(origin, format!("invalid node name '{}'", node));
    }

    let key = SymbolTable::node_key(node);
    if let Err(errors) = check_definition(loader, &key, origin) {
        return errors;
    }
    if let Some(group_origin) = loader.state().symbols.get(&SymbolTable::group_key(node)) {
        let note = format!("{}: previous definition was here", group_origin);
        let message = format!("{} was previously defined as a group", node);
        return loader.error_with_note(origin, message, note);
    }

    let tokens = &args[2..];
    for reserved in RESERVED_GROUPS {
        if tokens.iter().any(|g| g == reserved) {
            let hint = match reserved {
                "all" => "group 'all' automatically applies to all nodes",
                "none" => "use 'ignore_node' to disable a node",
                _ => "file extension _template is reserved for template files",
            };
            return loader.error_with_note(
                origin,
                format!("illegal to use group '{}' in node definition", reserved),
                format!("{}: {}", origin, hint),
            );
        }
    }
    if tokens.contains(node) {
        return loader.error(
            origin,
            format!("illegal to list '{}' as group for node {}", node, node),
        );
    }

    let (groups, specifier_tokens) = split_specifiers(tokens);
    if let Some(group) = groups.iter().find(|g| !spellcheck(g)) {
        return loader.error(origin, format!("invalid group name '{}'", group));
    }
    let specifiers = match parse_specifiers(loader.state(), node, specifier_tokens) {
        Ok(specifiers) => specifiers,
        Err(err) => return loader.error(origin, err.to_string()),
    };
    let groups = match expand_grouplist(loader.state_mut(), groups) {
        Ok(groups) => groups,
        Err(err) => {
            tracing::debug!("{}: {}", origin, err);
            return loader.error(origin, "a group list can not contain node names");
        }
    };

    define(loader, &key, origin);
    let state = loader.state_mut();
    if let Some(alias) = &specifiers.hostname {
        state.hostnames.insert(alias.clone(), node.clone());
    }
    if specifiers.host_id.is_some() {
        state.host_id = specifiers.host_id;
    }
    state.nodes.insert(
        node.clone(),
        NodeDefinition {
            name: node.clone(),
            groups,
            ipaddress: specifiers.ipaddress,
            hostname: specifiers.hostname,
            rsync: specifiers.rsync,
        },
    );
    0
}

/// `ignore_node` and `ignore_group`. Both end up in the ignored groups since
/// a node is a group of itself.
fn config_ignore_names(
    loader: &mut ConfigLoader,
    args: &[String],
    origin: &Origin,
    groups: bool,
) -> usize {
    let kind = if groups { "group" } else { "node" };
    let mut errors = 0;

    for name in &args[1..] {
        if !spellcheck(name) {
            errors += loader.error(origin, format!("invalid {} name '{}'", kind, name));
            continue;
        }
        match name.as_str() {
            "none" => continue,
            "all" | "template" => {
                errors += loader.error(origin, format!("illegal to ignore '{}'", name));
                continue;
            }
            _ => {}
        }

        let state = loader.state_mut();
        state.params.ignore_groups.insert(name.clone());
        if groups && !state.is_node(name) {
            state.groups.entry(name.clone()).or_default();
        }
    }
    errors
}

/// Expands `$prefix` and collapses repeated slashes.
pub fn prepare_path(path: &str, prefix: &str) -> String {
    strip_multiple_slashes(&path.replace("$prefix", prefix))
}

fn strip_multiple_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous = None;
    for c in path.chars() {
        if c == '/' && previous == Some('/') {
            continue;
        }
        out.push(c);
        previous = Some(c);
    }
    out
}
