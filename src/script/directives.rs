/// KDL directive parser for script sources
///
/// Scripts declare their external needs in comment lines starting with `//KIT`
/// or `#KIT`, each holding one or more KDL nodes:
///
/// ```text
/// //KIT depends-on "org.example:util:1.2.0"
/// //KIT repository "/opt/kit/repository"
/// //KIT include "common" "shared/helpers.kts"
/// //KIT import "Economy" "Economy:org.economy.api,org.economy.events"
/// //KIT compiler-options "-Xcontext-receivers"
/// ```
use kdl::{KdlDocument, KdlNode};
use thiserror::Error;

const PREFIXES: [&str; 2] = ["//KIT", "#KIT"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("line {line}: invalid KDL syntax: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: unknown directive: {name}")]
    Unknown { line: usize, name: String },

    #[error("line {line}: {name} requires at least one string argument")]
    MissingArgument { line: usize, name: String },
}

impl DirectiveError {
    pub fn line(&self) -> usize {
        match self {
            DirectiveError::Syntax { line, .. }
            | DirectiveError::Unknown { line, .. }
            | DirectiveError::MissingArgument { line, .. } => *line,
        }
    }
}

/// A single declaration collected from a script source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Library coordinates (`group:artifact:version`) to put on the classpath
    ExternalLibrary(Vec<String>),
    /// Extra locations the coordinate resolvers may search
    Repository(Vec<String>),
    /// Source fragments compiled together with the script
    Include(Vec<String>),
    /// Plugin or namespace names whose wildcards become default imports
    Import(Vec<String>),
    /// Options appended to the compiler invocation
    CompilerOption(Vec<String>),
}

/// A directive with the 1-based source line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDirective {
    pub line: usize,
    pub directive: Directive,
}

/// Collect every directive from a script source, in source order
pub fn collect_directives(source: &str) -> Result<Vec<SourceDirective>, DirectiveError> {
    let mut directives = Vec::new();

    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        let Some(body) = PREFIXES.iter().find_map(|p| trimmed.strip_prefix(p)) else {
            continue;
        };
        let line_no = index + 1;

        let doc: KdlDocument = body.trim().parse().map_err(|e| DirectiveError::Syntax {
            line: line_no,
            message: format!("{}", e),
        })?;

        for node in doc.nodes() {
            directives.push(SourceDirective {
                line: line_no,
                directive: parse_node(node, line_no)?,
            });
        }
    }

    Ok(directives)
}

fn parse_node(node: &KdlNode, line: usize) -> Result<Directive, DirectiveError> {
    let name = node.name().value();
    let args = positional_strings(node);
    if args.is_empty() {
        return Err(DirectiveError::MissingArgument {
            line,
            name: name.to_string(),
        });
    }

    match name {
        "depends-on" => Ok(Directive::ExternalLibrary(args)),
        "repository" => Ok(Directive::Repository(args)),
        "include" => Ok(Directive::Include(args)),
        "import" => Ok(Directive::Import(args)),
        "compiler-options" => Ok(Directive::CompilerOption(args)),
        _ => Err(DirectiveError::Unknown {
            line,
            name: name.to_string(),
        }),
    }
}

/// All positional string arguments of a node
fn positional_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_all_kinds() {
        let source = r#"//KIT depends-on "org.example:util:1.2.0" "org.example:io:2.0"
//KIT repository "/opt/repo"
// a plain comment
#KIT include "common"
    //KIT import "Economy:org.economy.api"; compiler-options "-Xfoo"
println("hi")
"#;
        let found = collect_directives(source).unwrap();

        assert_eq!(found.len(), 5);
        assert_eq!(
            found[0].directive,
            Directive::ExternalLibrary(vec![
                "org.example:util:1.2.0".to_string(),
                "org.example:io:2.0".to_string()
            ])
        );
        assert_eq!(found[1].directive, Directive::Repository(vec!["/opt/repo".into()]));
        assert_eq!(found[2].directive, Directive::Include(vec!["common".into()]));
        assert_eq!(found[2].line, 4);
        assert_eq!(
            found[3].directive,
            Directive::Import(vec!["Economy:org.economy.api".into()])
        );
        assert_eq!(found[4].directive, Directive::CompilerOption(vec!["-Xfoo".into()]));
        assert_eq!(found[4].line, 5);
    }

    #[test]
    fn test_no_directives() {
        assert!(collect_directives("println(1)\n").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_directive() {
        let err = collect_directives("//KIT teleport \"home\"").unwrap_err();
        assert_eq!(
            err,
            DirectiveError::Unknown {
                line: 1,
                name: "teleport".into()
            }
        );
    }

    #[test]
    fn test_missing_argument() {
        let err = collect_directives("\n//KIT include").unwrap_err();
        assert!(matches!(err, DirectiveError::MissingArgument { line: 2, .. }));
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = collect_directives("x\ny\n//KIT include \"open").unwrap_err();
        assert_eq!(err.line(), 3);
    }
}
