use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// Render a bundled prompt. Unknown variables are an error so a renamed
/// field cannot silently blank out part of a prompt.
pub fn render_prompt<C: Serialize>(template: &str, context: C) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.template_from_str(template)?.render(context)
}
