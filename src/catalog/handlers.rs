//! Handler convention rewrites.
//!
//! `fix-handlers` moves handlers from separate `State(pool)` / `State(auth)`
//! parameters to a single `State(state): State<AppState>`; `revert-handlers`
//! goes back to separate `Extension` parameters. Both work on raw text and
//! rely on the handler files being laid out the way the service writes them.

use super::{HANDLER_FILES, Manifest, Target, Transformation, TransformationKind, handler_path};
use crate::error::Result;
use crate::rule::{Guard, Matcher, Rule, RuleSet};
use std::path::PathBuf;

/// First `use axum::...;` statement including its line break.
const AXUM_IMPORT: &str = r"use axum::[^;]+;[ \t]*\n";
const APP_STATE_IMPORT: &str = "use crate::api::AppState;";
const POOL_EXTENSION: &str = "Extension(pool): Extension<Arc<PgPool>>";
const AUTH_EXTENSION: &str = "Extension(auth): Extension<Arc<Auth>>";

const HANDLERS_MANIFEST: &str = "\
pub mod auth;
pub mod user;
pub mod vulnerability;
pub mod team;
pub mod asset;
pub mod report;
pub mod plugin;
";

pub(super) fn fix_transformation() -> Result<Transformation> {
    let rules = fix_handlers()?;
    let mut targets: Vec<Target> = HANDLER_FILES
        .iter()
        .map(|module| Target::new(handler_path(module), rules.clone()))
        .collect();
    targets.push(Target::new(handler_path("auth"), fix_auth_handler()?));

    Ok(Transformation {
        kind: TransformationKind::FixHandlers,
        required_dir: PathBuf::from("src/handlers"),
        targets,
        manifests: vec![Manifest {
            path: PathBuf::from("src/handlers/mod.rs"),
            body: HANDLERS_MANIFEST.to_string(),
        }],
    })
}

pub(super) fn revert_transformation() -> Result<Transformation> {
    let rules = revert_handlers()?;
    let targets = HANDLER_FILES
        .iter()
        .map(|module| Target::new(handler_path(module), rules.clone()))
        .collect();

    Ok(Transformation {
        kind: TransformationKind::RevertHandlers,
        required_dir: PathBuf::from("src/handlers"),
        targets,
        manifests: Vec::new(),
    })
}

pub(crate) fn fix_handlers() -> Result<RuleSet> {
    RuleSet::new(
        "fix-handlers",
        vec![
            Rule::remove(
                "drop-raw-pool-imports",
                Matcher::regex(r"use sqlx::PgPool;\s*\n\s*use std::sync::Arc;[ \t]*\n")?,
            ),
            Rule::insert_after(
                "import-app-state",
                Matcher::regex(AXUM_IMPORT)?,
                format!("{}\n", APP_STATE_IMPORT),
            )
            .when(Guard::lacks(APP_STATE_IMPORT)),
            Rule::replace(
                "extract-app-state",
                Matcher::regex(r"State\(pool\):\s*State<Arc<PgPool>>")?,
                "State(state): State<AppState>",
            ),
            Rule::remove(
                "drop-auth-param",
                Matcher::regex(r",\s*State\(auth\):\s*State<Arc<Auth>>")?,
            ),
            Rule::replace(
                "pool-via-state",
                Matcher::regex(r"&\*\*?pool\b")?,
                "&*state.pool",
            ),
            // Only a plain identifier counts as a receiver; `foo().auth.x`
            // is still rewritten.
            Rule::replace_with(
                "auth-via-state",
                Matcher::regex(r"(?:\b\w+\.)?\bauth\.")?,
                route_auth_through_state,
            ),
            Rule::replace(
                "extract-app-state-any",
                Matcher::regex(r"State\(pool\):\s*State<(?:[^<>]|<(?:[^<>]|<[^<>]*>)*>)*>")?,
                "State(state): State<AppState>",
            )
            .after("extract-app-state"),
            // Heuristic: `Auth` followed by `{` before the next `;` is taken
            // as struct-literal use and keeps the import.
            Rule::remove(
                "drop-auth-import",
                Matcher::regex(r"use crate::auth::Auth;[ \t]*\n")?,
            )
            .when(Guard::All(vec![
                Guard::contains("state.auth"),
                Guard::contains("Auth;"),
                Guard::no_match(r"Auth[^;]*\{")?,
            ]))
            .after("auth-via-state"),
            Rule::replace_with(
                "import-extension-grouped",
                Matcher::braced(r"use axum::\{")?,
                append_extension,
            )
            .first_only()
            .when(Guard::All(vec![
                Guard::contains("Extension("),
                extension_unimported()?,
            ])),
            Rule::insert_after(
                "import-extension",
                Matcher::regex(AXUM_IMPORT)?,
                "use axum::Extension;\n",
            )
            .when(Guard::All(vec![
                Guard::contains("Extension("),
                extension_unimported()?,
                Guard::no_match(r"use axum::\{")?,
            ]))
            .after("import-extension-grouped"),
            Rule::replace(
                "claims-into-group",
                Matcher::regex(r"use crate::auth::\{")?,
                "use crate::auth::{Claims, ",
            )
            .first_only()
            .when(claims_unimported()?)
            .after("drop-auth-import"),
            Rule::replace(
                "claims-into-single",
                Matcher::regex(r"use crate::auth::(\w+);")?,
                "use crate::auth::{Claims, ${1}};",
            )
            .first_only()
            .when(claims_unimported()?)
            .after("claims-into-group"),
            Rule::insert_after(
                "import-claims",
                Matcher::regex(r"use crate::api::AppState;[ \t]*\n")?,
                "use crate::auth::Claims;\n",
            )
            .when(Guard::All(vec![
                claims_unimported()?,
                Guard::lacks("use crate::auth::"),
            ]))
            .after("import-app-state")
            .after("claims-into-single"),
        ],
    )
}

/// The auth handler keeps its raw pool; only double dereferences are normalized.
pub(crate) fn fix_auth_handler() -> Result<RuleSet> {
    RuleSet::new(
        "fix-auth-handler",
        vec![Rule::replace(
            "pool-deref-normalize",
            Matcher::regex(r"&\*\*pool\b")?,
            "&*pool",
        )],
    )
}

pub(crate) fn revert_handlers() -> Result<RuleSet> {
    RuleSet::new(
        "revert-handlers",
        vec![
            Rule::remove(
                "drop-app-state-import",
                Matcher::regex(r"use crate::api::AppState;[ \t]*\n")?,
            ),
            Rule::replace_with(
                "import-extension-grouped",
                Matcher::braced(r"use axum::\{")?,
                append_extension,
            )
            .first_only()
            .when(Guard::All(vec![
                Guard::lacks("Extension"),
                Guard::contains("State(state)"),
            ])),
            Rule::insert_after(
                "import-extension",
                Matcher::regex(AXUM_IMPORT)?,
                "use axum::Extension;\n",
            )
            .when(Guard::All(vec![
                Guard::lacks("Extension"),
                Guard::contains("State(state)"),
                Guard::no_match(r"use axum::\{")?,
            ]))
            .after("import-extension-grouped"),
            Rule::replace(
                "extract-pool-extension",
                Matcher::regex(r"State\(state\):\s*State<AppState>")?,
                POOL_EXTENSION,
            )
            .after("import-extension"),
            Rule::replace_with(
                "inject-auth-extension",
                Matcher::braced(r"pub async fn \w+")?,
                inject_auth_extension,
            )
            .when(Guard::contains("state.auth."))
            .after("extract-pool-extension"),
            Rule::replace("pool-direct", Matcher::regex(r"&\*state\.pool\b")?, "&*pool"),
            Rule::replace("auth-direct", Matcher::regex(r"\bstate\.auth\.")?, "auth.")
                .after("inject-auth-extension"),
            Rule::insert_after(
                "import-pg-pool",
                Matcher::regex(AXUM_IMPORT)?,
                "use sqlx::PgPool;\n",
            )
            .when(Guard::All(vec![
                Guard::Any(vec![Guard::contains("&*pool"), Guard::contains("Arc<PgPool>")]),
                Guard::lacks("use sqlx::PgPool;"),
            ]))
            .after("pool-direct"),
            Rule::insert_after(
                "import-arc",
                Matcher::regex(r"use sqlx::PgPool;[ \t]*\n")?,
                "use std::sync::Arc;\n",
            )
            .when(Guard::All(vec![
                Guard::contains("Arc<"),
                Guard::lacks("use std::sync::Arc;"),
            ]))
            .after("import-pg-pool"),
            Rule::replace(
                "auth-into-group",
                Matcher::regex(r"use crate::auth::\{")?,
                "use crate::auth::{Auth, ",
            )
            .first_only()
            .when(auth_unimported()?)
            .after("inject-auth-extension"),
            Rule::replace(
                "auth-into-single",
                Matcher::regex(r"use crate::auth::(\w+);")?,
                "use crate::auth::{Auth, ${1}};",
            )
            .first_only()
            .when(auth_unimported()?)
            .after("auth-into-group"),
            Rule::insert_after(
                "import-auth",
                Matcher::regex(r"use std::sync::Arc;[ \t]*\n")?,
                "use crate::auth::Auth;\n",
            )
            .when(Guard::All(vec![
                auth_unimported()?,
                Guard::lacks("use crate::auth::"),
            ]))
            .after("import-arc")
            .after("auth-into-single"),
        ],
    )
}

/// `Extension` imported from axum either standalone or inside a group
/// (one level of nested groups is looked through).
fn extension_unimported() -> Result<Guard> {
    Guard::no_match(r"use axum::(?:Extension\b|\{(?:[^{}]|\{[^{}]*\})*\bExtension\b)")
}

/// `Claims` used as a parameter type but imported in neither form.
fn claims_unimported() -> Result<Guard> {
    Ok(Guard::All(vec![
        Guard::Any(vec![Guard::contains("claims: Claims"), Guard::contains("Claims,")]),
        Guard::no_match(r"use crate::auth::(?:Claims\b|\{[^}]*\bClaims\b)")?,
    ]))
}

/// `Auth` extracted as a parameter but imported in neither form.
fn auth_unimported() -> Result<Guard> {
    Ok(Guard::All(vec![
        Guard::contains("Arc<Auth>"),
        Guard::no_match(r"use crate::auth::(?:Auth\b|\{[^}]*\bAuth\b)")?,
    ]))
}

fn route_auth_through_state(matched: &str) -> String {
    // Anything with a receiver (`state.auth.`, `self.auth.`) is already a field access.
    if matched == "auth." {
        "state.auth.".to_string()
    } else {
        matched.to_string()
    }
}

fn append_extension(group: &str) -> String {
    append_to_group(group, "Extension")
}

/// Adds `item` as the last entry of a braced import group.
pub(crate) fn append_to_group(group: &str, item: &str) -> String {
    let Some(inner) = group.strip_suffix('}') else {
        return group.to_string();
    };
    let inner = inner.trim_end();
    let inner = inner.strip_suffix(',').unwrap_or(inner);
    if inner.contains('\n') {
        format!("{},\n    {},\n}}", inner, item)
    } else {
        format!("{}, {}}}", inner, item)
    }
}

/// Adds the auth extension after the pool extension of a handler whose body
/// still reaches auth through the shared state.
fn inject_auth_extension(item: &str) -> String {
    let (signature, body) = item.split_at(item.find('{').unwrap_or(item.len()));
    if !body.contains("state.auth.") || signature.contains("Extension(auth)") {
        return item.to_string();
    }
    let Some(at) = signature.find(POOL_EXTENSION).map(|i| i + POOL_EXTENSION.len()) else {
        return item.to_string();
    };
    format!(
        "{},\n    {}{}{}",
        &signature[..at],
        AUTH_EXTENSION,
        &signature[at..],
        body
    )
}
