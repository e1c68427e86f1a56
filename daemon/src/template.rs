//! Framework templates
//!
//! Embedded scaffolding for the supported frameworks. `{{name}}` in file
//! contents is replaced with the project name at materialization time; the
//! generated vite config reads `PORT` from the environment, which is how the
//! dev-server port injection reaches the child process.

use std::path::Path;

use crate::error::DaemonError;
use crate::registry::Framework;

pub struct TemplateFile {
    pub path: &'static str,
    pub contents: &'static str,
}

const REACT_TEMPLATE: &[TemplateFile] = &[
    TemplateFile {
        path: "package.json",
        contents: r#"{
  "name": "{{package_name}}",
  "private": true,
  "version": "0.1.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview"
  },
  "dependencies": {
    "react": "^18.2.0",
    "react-dom": "^18.2.0"
  },
  "devDependencies": {
    "@vitejs/plugin-react": "^4.2.0",
    "vite": "^5.0.0"
  }
}
"#,
    },
    TemplateFile {
        path: "vite.config.js",
        contents: r#"import { defineConfig } from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({
  plugins: [react()],
  server: {
    port: Number(process.env.PORT) || 5173,
    strictPort: true,
  },
})
"#,
    },
    TemplateFile {
        path: "index.html",
        contents: r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{{name}}</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#,
    },
    TemplateFile {
        path: "src/main.jsx",
        contents: r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#,
    },
    TemplateFile {
        path: "src/App.jsx",
        contents: r#"export default function App() {
  return (
    <main>
      <h1>{{name}}</h1>
      <p>Start building your app.</p>
    </main>
  )
}
"#,
    },
];

const VUE_TEMPLATE: &[TemplateFile] = &[
    TemplateFile {
        path: "package.json",
        contents: r#"{
  "name": "{{package_name}}",
  "private": true,
  "version": "0.1.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview"
  },
  "dependencies": {
    "vue": "^3.4.0"
  },
  "devDependencies": {
    "@vitejs/plugin-vue": "^5.0.0",
    "vite": "^5.0.0"
  }
}
"#,
    },
    TemplateFile {
        path: "vite.config.js",
        contents: r#"import { defineConfig } from 'vite'
import vue from '@vitejs/plugin-vue'

export default defineConfig({
  plugins: [vue()],
  server: {
    port: Number(process.env.PORT) || 5173,
    strictPort: true,
  },
})
"#,
    },
    TemplateFile {
        path: "index.html",
        contents: r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{{name}}</title>
  </head>
  <body>
    <div id="app"></div>
    <script type="module" src="/src/main.js"></script>
  </body>
</html>
"#,
    },
    TemplateFile {
        path: "src/main.js",
        contents: r#"import { createApp } from 'vue'
import App from './App.vue'

createApp(App).mount('#app')
"#,
    },
    TemplateFile {
        path: "src/App.vue",
        contents: r#"<template>
  <main>
    <h1>{{name}}</h1>
    <p>Start building your app.</p>
  </main>
</template>
"#,
    },
];

pub fn for_framework(framework: Framework) -> &'static [TemplateFile] {
    match framework {
        Framework::React => REACT_TEMPLATE,
        Framework::Vue => VUE_TEMPLATE,
    }
}

/// Write a framework's template into `dest`, substituting placeholders with
/// the project name.
pub fn materialize(framework: Framework, dest: &Path, name: &str) -> Result<(), DaemonError> {
    let package_name = crate::registry::sanitize_name(name);
    for file in for_framework(framework) {
        let contents = file
            .contents
            .replace("{{package_name}}", &package_name)
            .replace("{{name}}", name);
        let target = dest.join(file.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, contents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_substitutes_project_name() {
        let dir = tempfile::tempdir().unwrap();
        materialize(Framework::React, dir.path(), "todo").unwrap();

        let index = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(index.contains("<title>todo</title>"));
        assert!(!index.contains("{{name}}"));

        let app = std::fs::read_to_string(dir.path().join("src/App.jsx")).unwrap();
        assert!(app.contains("<h1>todo</h1>"));
    }

    #[test]
    fn materialized_manifest_is_valid_json_with_framework_dependency() {
        let dir = tempfile::tempdir().unwrap();
        materialize(Framework::Vue, dir.path(), "My Gallery").unwrap();

        let manifest = std::fs::read_to_string(dir.path().join("package.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(value["name"], "my-gallery");
        assert!(value["dependencies"].get("vue").is_some());
    }

    #[test]
    fn vite_config_reads_port_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        materialize(Framework::React, dir.path(), "todo").unwrap();

        let config = std::fs::read_to_string(dir.path().join("vite.config.js")).unwrap();
        assert!(config.contains("process.env.PORT"));
    }
}
