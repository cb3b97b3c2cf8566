//! Mountable file trees and the starter project template.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, to_string_pretty};

/// A directory level of a mountable tree, keyed by entry name.
pub type MountTree = BTreeMap<String, MountEntry>;

/// One entry of a [`MountTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountEntry {
    /// A file and its contents
    File {
        /// File contents
        contents: String,
    },
    /// A nested directory
    Directory(MountTree),
}

impl MountEntry {
    /// Creates a file entry.
    pub fn file(contents: impl Into<String>) -> Self {
        Self::File {
            contents: contents.into(),
        }
    }

    /// Creates a directory entry from `(name, entry)` pairs.
    pub fn directory<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Self)>,
        S: Into<String>,
    {
        Self::Directory(
            entries
                .into_iter()
                .map(|(name, entry)| (name.into(), entry))
                .collect(),
        )
    }
}

/// Flattens a tree into `(relative path, contents)` pairs, directories first.
///
/// Directories are yielded with `None` contents so empty ones survive mounting.
pub fn flatten(tree: &MountTree) -> Vec<(String, Option<String>)> {
    let mut entries = Vec::new();
    flatten_into(tree, "", &mut entries);
    entries
}

fn flatten_into(tree: &MountTree, prefix: &str, entries: &mut Vec<(String, Option<String>)>) {
    for (name, entry) in tree {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        match entry {
            MountEntry::File { contents } => entries.push((path, Some(contents.clone()))),
            MountEntry::Directory(children) => {
                entries.push((path.clone(), None));
                flatten_into(children, &path, entries);
            }
        }
    }
}

/// The Next.js starter project mounted into a fresh sandbox.
pub fn starter_template() -> MountTree {
    let package_json = json!({
        "name": "nextjs-app",
        "version": "0.1.0",
        "private": true,
        "scripts": {
            "dev": "next dev --turbopack",
            "build": "next build",
            "start": "next start",
            "lint": "next lint"
        },
        "dependencies": {
            "next": "^15.0.0",
            "react": "^19.0.0",
            "react-dom": "^19.0.0"
        },
        "devDependencies": {
            "@types/node": "^20",
            "@types/react": "^19",
            "@types/react-dom": "^19",
            "typescript": "^5",
            "tailwindcss": "^4",
            "@tailwindcss/postcss": "^4"
        }
    });
    let tsconfig_json = json!({
        "compilerOptions": {
            "target": "ES2017",
            "lib": ["dom", "dom.iterable", "esnext"],
            "allowJs": true,
            "skipLibCheck": true,
            "strict": true,
            "noEmit": true,
            "esModuleInterop": true,
            "module": "esnext",
            "moduleResolution": "bundler",
            "resolveJsonModule": true,
            "isolatedModules": true,
            "jsx": "preserve",
            "incremental": true,
            "plugins": [{"name": "next"}],
            "paths": {"@/*": ["./src/*"]}
        },
        "include": ["next-env.d.ts", "**/*.ts", "**/*.tsx", ".next/types/**/*.ts"],
        "exclude": ["node_modules"]
    });

    let app = MountEntry::directory([
        ("page.tsx", MountEntry::file(PAGE_TSX)),
        ("layout.tsx", MountEntry::file(LAYOUT_TSX)),
        ("globals.css", MountEntry::file(GLOBALS_CSS)),
    ]);

    [
        (
            "package.json",
            MountEntry::file(to_string_pretty(&package_json).unwrap_or_default()),
        ),
        (
            "tsconfig.json",
            MountEntry::file(to_string_pretty(&tsconfig_json).unwrap_or_default()),
        ),
        ("next.config.ts", MountEntry::file(NEXT_CONFIG_TS)),
        ("postcss.config.mjs", MountEntry::file(POSTCSS_CONFIG_MJS)),
        ("src", MountEntry::directory([("app", app)])),
    ]
    .into_iter()
    .map(|(name, entry)| (name.to_owned(), entry))
    .collect()
}

const NEXT_CONFIG_TS: &str = "const config = {};\nexport default config;\n";

const POSTCSS_CONFIG_MJS: &str = r"/** @type {import('postcss-load-config').Config} */
const config = {
  plugins: {
    '@tailwindcss/postcss': {},
  },
};

export default config;
";

const PAGE_TSX: &str = r#"export default function Home() {
  return (
    <main className="flex min-h-screen flex-col items-center justify-center p-24">
      <h1 className="text-4xl font-bold">Welcome to Next.js</h1>
    </main>
  );
}
"#;

const LAYOUT_TSX: &str = r#"import "./globals.css";

export default function RootLayout({
  children,
}: {
  children: React.ReactNode;
}) {
  return (
    <html lang="en">
      <body>{children}</body>
    </html>
  );
}
"#;

const GLOBALS_CSS: &str = "@import \"tailwindcss\";\n";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, from_str};

    #[test]
    fn test_starter_template_layout() {
        let tree = starter_template();
        let paths: Vec<_> = flatten(&tree).into_iter().map(|(path, _)| path).collect();

        assert!(paths.contains(&"package.json".to_owned()));
        assert!(paths.contains(&"src".to_owned()));
        assert!(paths.contains(&"src/app/page.tsx".to_owned()));
        let src = paths.iter().position(|path| path == "src").unwrap();
        let page = paths.iter().position(|path| path == "src/app/page.tsx").unwrap();
        assert!(src < page);
    }

    #[test]
    fn test_package_json_is_valid() {
        let tree = starter_template();
        let Some(MountEntry::File { contents }) = tree.get("package.json") else {
            panic!("package.json missing");
        };
        let parsed: Value = from_str(contents).unwrap();
        assert_eq!(parsed["scripts"]["dev"], "next dev --turbopack");
    }
}
