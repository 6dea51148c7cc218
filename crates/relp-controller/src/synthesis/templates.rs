use super::artifacts::{Result, SynthesisError};
use handlebars::{no_escape, Handlebars};
use serde::Serialize;

pub const FORWARDER_CONFIG: &str = "forwarder_config";
pub const APPLY_SCRIPT: &str = "apply_script";
pub const CONFIGURATOR_UNIT: &str = "configurator_unit";

/// Templates compiled into the binary, keyed by registration name.
const TEMPLATES: &[(&str, &str)] = &[
    (
        FORWARDER_CONFIG,
        include_str!("../../templates/rsyslog/60-audit.conf.hbs"),
    ),
    (
        APPLY_SCRIPT,
        include_str!("../../templates/node/configure-rsyslog.sh.hbs"),
    ),
    (
        CONFIGURATOR_UNIT,
        include_str!("../../templates/node/rsyslog-configurator.service.hbs"),
    ),
];

/// Renders one of the embedded templates. Output is never HTML-escaped since
/// every template produces configuration or shell text.
pub fn render<T: Serialize>(name: &str, data: &T) -> Result<String> {
    let source = TEMPLATES
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, source)| *source)
        .ok_or_else(|| SynthesisError::Template(format!("unknown template '{name}'")))?;

    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars.register_escape_fn(no_escape);
    handlebars
        .register_template_string(name, source)
        .map_err(|e| SynthesisError::Template(format!("failed to register {name}: {e}")))?;

    handlebars
        .render(name, data)
        .map_err(|e| SynthesisError::Template(format!("failed to render {name}: {e}")))
}
