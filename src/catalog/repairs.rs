//! Targeted one-shot repairs.
//!
//! `final-fix` patches specific leftovers of the handler migration;
//! `sqlx-type-fix` makes model enums and `COUNT` bindings line up with what
//! sqlx expects from the database.

use super::{Target, Transformation, TransformationKind, handler_path};
use crate::error::Result;
use crate::rule::{Guard, Matcher, Rule, RuleSet};
use std::path::PathBuf;

/// Model enums stored as Postgres enum types, per model file.
const SQLX_ENUMS: [(&str, &[&str]); 4] = [
    ("vulnerability", &["VulnerabilityStatus", "VulnerabilitySeverity"]),
    ("asset", &["AssetType"]),
    ("report", &["ReportType", "ReportStatus", "ReportFormat"]),
    ("plugin", &["PluginType"]),
];

/// Handlers binding a `COUNT(*)` through `query_scalar!`.
const COUNT_BINDINGS: [(&str, &str); 2] = [("team", "assigned_vulns"), ("asset", "associated_vulns")];

pub(super) fn final_fix_transformation() -> Result<Transformation> {
    let mut report_rules = vec![Rule::replace(
        "missing-import-comma",
        Matcher::lines(["    Json", "    Extension,"]),
        "    Json,\n    Extension,",
    )];
    report_rules.extend(unused_state_import_rules());

    let cleanup = RuleSet::new("drop-unused-state-import", unused_state_import_rules())?;

    let mut targets = vec![
        Target::new(handler_path("report"), RuleSet::new("final-fix/report", report_rules)?),
        Target::new(
            handler_path("user"),
            RuleSet::new(
                "final-fix/user",
                vec![Rule::replace(
                    "stale-get-user-call",
                    Matcher::regex(r"get_user\(State\(state\), Path\(user_id\)\)\.await")?,
                    "get_user(Extension(pool), Path(user_id)).await",
                )],
            )?,
        ),
        Target::new("src/plugins/mod.rs", plugin_manager_module()?),
        Target::new(
            "src/main.rs",
            RuleSet::new(
                "final-fix/main",
                vec![Rule::replace(
                    "plugin-manager-ctor",
                    Matcher::regex(
                        r"let plugin_manager = Arc::new\(PluginManager::new\(&config\.plugins\.directory\)\);",
                    )?,
                    "let plugin_manager = Arc::new(PluginManager::new(config.plugins.clone()));",
                )],
            )?,
        ),
    ];
    targets.extend(
        ["vulnerability", "team", "asset", "plugin"]
            .iter()
            .map(|module| Target::new(handler_path(module), cleanup.clone())),
    );

    Ok(Transformation {
        kind: TransformationKind::FinalFix,
        required_dir: PathBuf::from("src"),
        targets,
        manifests: Vec::new(),
    })
}

/// Drops `State` from axum imports in handlers that extract through `Extension`.
///
/// Heuristic: `, State,` / `, State}` anywhere in the file are treated as
/// import entries. A file still calling `State(` keeps its import.
fn unused_state_import_rules() -> Vec<Rule> {
    let unused = || {
        Guard::All(vec![Guard::contains("Extension("), Guard::lacks("State(")])
    };
    vec![
        Rule::replace("drop-state-import", Matcher::literal(", State,"), ",").when(unused()),
        Rule::replace("drop-state-import-last", Matcher::literal(", State}"), "}").when(unused()),
    ]
}

fn plugin_manager_module() -> Result<RuleSet> {
    RuleSet::new(
        "final-fix/plugins",
        vec![
            Rule::insert_before(
                "import-hash-map",
                Matcher::regex(r"\A")?,
                "use std::collections::HashMap;\n",
            )
            .when(Guard::lacks("use std::collections::HashMap;")),
            Rule::replace(
                "plugin-manager-fields",
                Matcher::regex(r"plugins: RwLock::new\(HashMap::new\(\)\),\s*directory: config\.directory,")?,
                "config,",
            ),
        ],
    )
}

pub(super) fn sqlx_type_transformation() -> Result<Transformation> {
    let mut targets = Vec::new();

    for (model, enums) in SQLX_ENUMS {
        let rules = enums
            .iter()
            .copied()
            .map(sqlx_enum_rule)
            .collect::<Result<Vec<_>>>()?;
        targets.push(Target::new(
            PathBuf::from("src/models").join(format!("{}.rs", model)),
            RuleSet::new(format!("sqlx-type-fix/{}", model), rules)?,
        ));
    }

    for (module, binding) in COUNT_BINDINGS {
        targets.push(Target::new(
            handler_path(module),
            RuleSet::new(
                format!("sqlx-type-fix/{}-count", module),
                vec![nullable_count_rule(binding)?],
            )?,
        ));
    }

    targets.push(Target::new(
        "src/main.rs",
        RuleSet::new(
            "sqlx-type-fix/main",
            vec![Rule::replace(
                "disable-migrations",
                Matcher::regex(
                    r#"(?m)^([ \t]*)sqlx::migrate!\("\./migrations"\)\s*\.run\(&pool\)\s*\.await\?;"#,
                )?,
                r#"${1}// sqlx::migrate!("./migrations").run(&pool).await?;"#,
            )],
        )?,
    ));

    Ok(Transformation {
        kind: TransformationKind::SqlxTypeFix,
        required_dir: PathBuf::from("src"),
        targets,
        manifests: Vec::new(),
    })
}

/// Derives `sqlx::Type` on `name` and maps it to its snake_case Postgres type.
///
/// Attributes between the derive and the enum are kept in place.
fn sqlx_enum_rule(name: &str) -> Result<Rule> {
    let pattern = format!(
        r"#\[derive\([^)]*\)\][ \t]*\r?\n(?:[ \t]*#\[[^\n]*\][ \t]*\r?\n)*[ \t]*pub enum {}\b",
        regex::escape(name)
    );
    let type_name = format!("type_name = \"{}\"", to_snake_case(name));
    Ok(
        Rule::replace_with(format!("derive-sqlx-type:{}", name), Matcher::regex(&pattern)?, derive_sqlx_type)
            .when(Guard::lacks(type_name)),
    )
}

fn derive_sqlx_type(item: &str) -> String {
    let Some((head, decl)) = item.rsplit_once('\n') else {
        return item.to_string();
    };
    let Some(name) = decl.trim_start().strip_prefix("pub enum ") else {
        return item.to_string();
    };
    let indent = &decl[..decl.len() - decl.trim_start().len()];

    let head = match head.split_once(")]") {
        Some((derives, rest)) if !derives.contains("sqlx::Type") => {
            let derives = derives.trim_end().trim_end_matches(',');
            let separator = if derives.ends_with('(') { "" } else { ", " };
            format!("{}{}sqlx::Type)]{}", derives, separator, rest)
        }
        _ => head.to_string(),
    };

    format!(
        "{}\n{}#[sqlx(type_name = \"{}\", rename_all = \"snake_case\")]\n{}",
        head,
        indent,
        to_snake_case(name),
        decl
    )
}

/// Drops the `i64` annotation on a `COUNT` binding and defaults a NULL result to zero.
///
/// The match never crosses a `;`, so only the binding's own statement is rewritten.
fn nullable_count_rule(binding: &str) -> Result<Rule> {
    let binding = regex::escape(binding);
    let pattern = format!(
        r"let {}: i64 = (sqlx::query_scalar!\([^;]*?\))\s*\.fetch_one\(([^;]*?)\)\s*\.await([^;]*?)\?;",
        binding
    );
    let template = format!(
        "let {} = ${{1}}\n    .fetch_one(${{2}})\n    .await${{3}}?\n    .unwrap_or(0);",
        binding
    );
    Ok(Rule::replace(
        format!("nullable-count:{}", binding),
        Matcher::regex(&pattern)?,
        template,
    ))
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::transformation;

    fn rules_for(kind: TransformationKind, path: &str) -> RuleSet {
        transformation(kind)
            .unwrap()
            .targets
            .into_iter()
            .find(|t| t.path == PathBuf::from(path))
            .map(|t| t.rules)
            .unwrap()
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(to_snake_case("VulnerabilityStatus"), "vulnerability_status");
        assert_eq!(to_snake_case("AssetType"), "asset_type");
        assert_eq!(to_snake_case("Plugin"), "plugin");
    }

    #[test]
    fn enum_gains_sqlx_type() {
        let rules = rules_for(TransformationKind::SqlxTypeFix, "src/models/asset.rs");
        let source = "\
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum AssetType {
    Server,
    Workstation,
}
";
        insta::assert_snapshot!(rules.apply(source).content, @r#"
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, sqlx::Type)]
        #[sqlx(type_name = "asset_type", rename_all = "snake_case")]
        pub enum AssetType {
            Server,
            Workstation,
        }
        "#);
    }

    #[test]
    fn enum_rule_keeps_intermediate_attributes_and_is_idempotent() {
        let rules = rules_for(TransformationKind::SqlxTypeFix, "src/models/report.rs");
        let source = "\
#[derive(Debug, Clone)]
#[serde(rename_all = \"lowercase\")]
pub enum ReportFormat {
    Pdf,
}

#[derive(Debug, Clone, sqlx::Type)]
pub enum ReportStatus {
    Done,
}
";
        let once = rules.apply(source);
        assert_eq!(
            once.content,
            "\
#[derive(Debug, Clone, sqlx::Type)]
#[serde(rename_all = \"lowercase\")]
#[sqlx(type_name = \"report_format\", rename_all = \"snake_case\")]
pub enum ReportFormat {
    Pdf,
}

#[derive(Debug, Clone, sqlx::Type)]
#[sqlx(type_name = \"report_status\", rename_all = \"snake_case\")]
pub enum ReportStatus {
    Done,
}
"
        );
        assert_eq!(
            once.fired,
            vec!["derive-sqlx-type:ReportStatus", "derive-sqlx-type:ReportFormat"]
        );
        assert!(rules.apply(&once.content).fired.is_empty());
    }

    #[test]
    fn enums_not_listed_are_untouched() {
        let rules = rules_for(TransformationKind::SqlxTypeFix, "src/models/plugin.rs");
        let source = "#[derive(Debug)]\npub enum PluginTypeKind {\n    A,\n}\n";
        assert_eq!(rules.apply(source).content, source);
    }

    #[test]
    fn nullable_count_defaults_to_zero() {
        let rules = rules_for(TransformationKind::SqlxTypeFix, "src/handlers/team.rs");
        let source = r#"    let assigned_vulns: i64 = sqlx::query_scalar!(
        "SELECT COUNT(*) FROM vulnerabilities WHERE team_id = $1",
        id
    )
    .fetch_one(&*pool)
    .await
    .map_err(|e| internal(e))?;
"#;
        let expected = r#"    let assigned_vulns = sqlx::query_scalar!(
        "SELECT COUNT(*) FROM vulnerabilities WHERE team_id = $1",
        id
    )
    .fetch_one(&*pool)
    .await
    .map_err(|e| internal(e))?
    .unwrap_or(0);
"#;
        assert_eq!(rules.apply(source).content, expected);
        let once = rules.apply(source).content;
        assert_eq!(rules.apply(&once).content, once);
    }

    #[test]
    fn count_rewrite_stays_within_its_statement() {
        let rules = rules_for(TransformationKind::SqlxTypeFix, "src/handlers/team.rs");
        let source = "\
    let assigned_vulns: i64 = sqlx::query_scalar!(\"SELECT COUNT(*) FROM v\").fetch_optional(&*pool).await?.unwrap_or(0);
    let team = load().fetch_one(&*pool).await?;
";
        let applied = rules.apply(source);
        assert!(applied.fired.is_empty());
        assert_eq!(applied.content, source);
    }

    #[test]
    fn migrations_are_commented_out_once() {
        let rules = rules_for(TransformationKind::SqlxTypeFix, "src/main.rs");
        let source = "    sqlx::migrate!(\"./migrations\")\n        .run(&pool)\n        .await?;\n";
        let once = rules.apply(source).content;
        assert_eq!(once, "    // sqlx::migrate!(\"./migrations\").run(&pool).await?;\n");
        assert_eq!(rules.apply(&once).content, once);
    }

    #[test]
    fn report_comma_and_state_import() {
        let rules = rules_for(TransformationKind::FinalFix, "src/handlers/report.rs");
        let source = "\
use axum::{
    extract::{Path, State},
    Json
    Extension,
};
pub async fn f(Extension(pool): Extension<Arc<PgPool>>) {}
";
        let fixed = rules.apply(source).content;
        assert_eq!(
            fixed,
            "\
use axum::{
    extract::{Path},
    Json,
    Extension,
};
pub async fn f(Extension(pool): Extension<Arc<PgPool>>) {}
"
        );
        assert_eq!(rules.apply(&fixed).content, fixed);
    }

    #[test]
    fn state_import_kept_while_state_is_extracted() {
        let rules = rules_for(TransformationKind::FinalFix, "src/handlers/team.rs");
        let source = "use axum::extract::{Path, State, Query};\nfn f(State(s): State<S>, Extension(x): Extension<X>) {}\n";
        assert_eq!(rules.apply(source).content, source);

        let source = "use axum::extract::{Path, State, Query};\nfn f(Extension(x): Extension<X>) {}\n";
        assert!(rules.apply(source).content.starts_with("use axum::extract::{Path, Query};"));
    }

    #[test]
    fn stale_get_user_call_rewritten() {
        let rules = rules_for(TransformationKind::FinalFix, "src/handlers/user.rs");
        let source = "    get_user(State(state), Path(user_id)).await\n";
        assert_eq!(
            rules.apply(source).content,
            "    get_user(Extension(pool), Path(user_id)).await\n"
        );
    }

    #[test]
    fn plugin_manager_constructor_matches_struct() {
        let rules = rules_for(TransformationKind::FinalFix, "src/plugins/mod.rs");
        let source = "\
use tokio::sync::RwLock;

impl PluginManager {
    pub fn new(config: PluginConfig) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            directory: config.directory,
        }
    }
}
";
        let fixed = rules.apply(source);
        assert!(fixed.content.starts_with("use std::collections::HashMap;\nuse tokio::sync::RwLock;\n"));
        assert!(fixed.content.contains("        Self {\n            config,\n        }"));
        assert_eq!(fixed.fired, vec!["import-hash-map", "plugin-manager-fields"]);
        assert!(rules.apply(&fixed.content).fired.is_empty());
    }

    #[test]
    fn plugin_manager_call_site() {
        let rules = rules_for(TransformationKind::FinalFix, "src/main.rs");
        let source = "    let plugin_manager = Arc::new(PluginManager::new(&config.plugins.directory));\n";
        assert_eq!(
            rules.apply(source).content,
            "    let plugin_manager = Arc::new(PluginManager::new(config.plugins.clone()));\n"
        );
    }
}
