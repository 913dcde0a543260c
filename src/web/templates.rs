use minijinja::Environment;
use tracing::error;

pub fn init_templates() -> Environment<'static> {
    let mut env = Environment::new();

    // Register built-in templates
    env.add_template("index.html", include_str!("../../templates/index.html"))
        .expect("Failed to add index template");
    env.add_template("error.html", include_str!("../../templates/error.html"))
        .expect("Failed to add error template");

    // Add filters
    env.add_filter("json", |value: minijinja::value::Value| {
        serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
    });

    env
}

pub fn render_template(
    env: &Environment,
    template_name: &str,
    context: minijinja::value::Value,
) -> String {
    match env.get_template(template_name) {
        Ok(tmpl) => match tmpl.render(context) {
            Ok(result) => result,
            Err(e) => {
                error!("Template render error: {}", e);
                render_error(env, &e.to_string())
            }
        },
        Err(e) => {
            error!("Template not found: {} ({})", template_name, e);
            format!("<h1>Template Not Found</h1><p>{}: {}</p>", template_name, e)
        }
    }
}

fn render_error(env: &Environment, message: &str) -> String {
    env.get_template("error.html")
        .and_then(|tmpl| tmpl.render(minijinja::context! { message => message }))
        .unwrap_or_else(|_| format!("<h1>Template Error</h1><p>{}</p>", message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_renders_with_settings() {
        let env = init_templates();
        let html = render_template(
            &env,
            "index.html",
            minijinja::context! {
                title => "SQLAsk",
                default_max_rows => 20,
                min_rows => 5,
                max_rows => 100,
                execution_mode => "read_only",
            },
        );

        assert!(html.contains("SQLAsk"));
        assert!(html.contains(r#"value="20""#));
        assert!(html.contains("read_only"));
    }

    #[test]
    fn unknown_template_is_reported() {
        let env = init_templates();
        let html = render_template(&env, "missing.html", minijinja::context! {});
        assert!(html.contains("Template Not Found"));
    }
}
