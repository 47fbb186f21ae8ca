//! Compiler invocation templates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the compiler is launched inside a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum InvocationShape {
    /// `<runner> <package> <source_glob> <out_dir>`
    Package { runner: String, package: String },

    /// `<executable> <source> <out_dir_flag> <out_dir>`
    Direct {
        executable: String,
        #[serde(default = "default_out_dir_flag")]
        out_dir_flag: String,
    },

    /// Free-form arguments; `{source}`, `{source_glob}`, `{out_dir}` and
    /// `{workspace}` are substituted.
    Custom { program: String, args: Vec<String> },
}

impl Default for InvocationShape {
    fn default() -> Self {
        InvocationShape::Package {
            runner: "npx".to_string(),
            package: "@algorandfoundation/tealscript".to_string(),
        }
    }
}

fn default_out_dir_flag() -> String {
    "--outDir".to_string()
}

/// Workspace-specific values substituted into a template
#[derive(Debug, Clone)]
pub struct InvocationContext<'a> {
    pub workspace: &'a Path,
    pub source: &'a str,
    pub source_glob: &'a str,
    pub out_dir: &'a str,
}

/// A fully rendered compiler command
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Overrides layered on top of the inherited environment
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl InvocationShape {
    pub fn program(&self) -> &str {
        match self {
            InvocationShape::Package { runner, .. } => runner,
            InvocationShape::Direct { executable, .. } => executable,
            InvocationShape::Custom { program, .. } => program,
        }
    }

    pub fn render_args(&self, ctx: &InvocationContext<'_>) -> Vec<String> {
        match self {
            InvocationShape::Package { package, .. } => vec![
                package.clone(),
                ctx.source_glob.to_string(),
                ctx.out_dir.to_string(),
            ],
            InvocationShape::Direct { out_dir_flag, .. } => vec![
                ctx.source.to_string(),
                out_dir_flag.clone(),
                ctx.out_dir.to_string(),
            ],
            InvocationShape::Custom { args, .. } => {
                args.iter().map(|arg| substitute(arg, ctx)).collect()
            }
        }
    }

    pub fn render(
        &self,
        ctx: &InvocationContext<'_>,
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Invocation {
        Invocation {
            program: self.program().to_string(),
            args: self.render_args(ctx),
            cwd: ctx.workspace.to_path_buf(),
            env: env.clone(),
            timeout,
        }
    }
}

fn substitute(arg: &str, ctx: &InvocationContext<'_>) -> String {
    arg.replace("{source_glob}", ctx.source_glob)
        .replace("{source}", ctx.source)
        .replace("{out_dir}", ctx.out_dir)
        .replace("{workspace}", &ctx.workspace.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(workspace: &Path) -> InvocationContext<'_> {
        InvocationContext {
            workspace,
            source: "src/contract.algo.ts",
            source_glob: "src/*.algo.ts",
            out_dir: "artifacts",
        }
    }

    #[test]
    fn package_shape_matches_npx_invocation() {
        let shape = InvocationShape::default();
        let workspace = Path::new("/tmp/ws");
        let invocation = shape.render(&ctx(workspace), &BTreeMap::new(), Duration::from_secs(1));
        assert_eq!(invocation.program, "npx");
        assert_eq!(
            invocation.args,
            vec!["@algorandfoundation/tealscript", "src/*.algo.ts", "artifacts"]
        );
        assert_eq!(invocation.cwd, workspace);
    }

    #[test]
    fn direct_shape_passes_single_source_and_out_dir_flag() {
        let shape = InvocationShape::Direct {
            executable: "tealscript".to_string(),
            out_dir_flag: default_out_dir_flag(),
        };
        let args = shape.render_args(&ctx(Path::new("/tmp/ws")));
        assert_eq!(args, vec!["src/contract.algo.ts", "--outDir", "artifacts"]);
    }

    #[test]
    fn custom_shape_substitutes_placeholders() {
        let shape = InvocationShape::Custom {
            program: "sh".to_string(),
            args: vec![
                "build.sh".to_string(),
                "--in={source}".to_string(),
                "{source_glob}".to_string(),
                "{workspace}/{out_dir}".to_string(),
            ],
        };
        let args = shape.render_args(&ctx(Path::new("/tmp/ws")));
        assert_eq!(
            args,
            vec![
                "build.sh",
                "--in=src/contract.algo.ts",
                "src/*.algo.ts",
                "/tmp/ws/artifacts"
            ]
        );
    }

    #[test]
    fn shape_deserializes_from_tagged_config() {
        let shape: InvocationShape =
            serde_json::from_str(r#"{"shape":"direct","executable":"tealscript"}"#).unwrap();
        assert_eq!(
            shape,
            InvocationShape::Direct {
                executable: "tealscript".to_string(),
                out_dir_flag: "--outDir".to_string(),
            }
        );
    }
}
