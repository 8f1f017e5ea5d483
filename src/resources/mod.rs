//! Collections served by the API and the column rules each one enforces.
//!
//! Every entity endpoint is driven by a [`ResourceDef`]: which table it lives
//! in, which fields a client may write, which are required on create, which
//! column names the owning user, and which defaults the server fills in.

pub mod fields;
pub mod youth;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use fields::{field, is_blank, FieldKind, FieldSpec};

pub const ESTADOS_JOVEN: &[&str] = &["activo", "egresado", "trasladado", "inactivo"];
pub const TIPOS_ATENCION: &[&str] = &["salud", "legal", "psicologica", "pedagogica", "trabajo_social", "seguridad"];
pub const ESTADOS_ATENCION: &[&str] = &["pendiente", "en_proceso", "completada", "cancelada"];
pub const TIPOS_FORMULARIO: &[&str] = &[
    "ingreso",
    "psicologico",
    "medico",
    "juridico",
    "pedagogico",
    "trabajo_social",
    "seguridad",
];
pub const ROLES: &[&str] = &[
    "admin",
    "pedagogo",
    "abogado",
    "medico",
    "psicologo",
    "trabajador_social",
    "seguridad",
];
pub const TIPOS_NOTIFICACION: &[&str] = &[
    "cita_proxima",
    "seguimiento_pendiente",
    "atencion_vencida",
    "sistema",
    "recordatorio",
];
pub const PRIORIDADES: &[&str] = &["baja", "media", "alta", "urgente"];

/// Columns the server owns on every table; never taken from a request body
pub const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Professional role stored on a user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Pedagogo,
    Abogado,
    Medico,
    Psicologo,
    TrabajadorSocial,
    Seguridad,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Pedagogo => "pedagogo",
            Role::Abogado => "abogado",
            Role::Medico => "medico",
            Role::Psicologo => "psicologo",
            Role::TrabajadorSocial => "trabajador_social",
            Role::Seguridad => "seguridad",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "pedagogo" => Ok(Role::Pedagogo),
            "abogado" => Ok(Role::Abogado),
            "medico" => Ok(Role::Medico),
            "psicologo" => Ok(Role::Psicologo),
            "trabajador_social" => Ok(Role::TrabajadorSocial),
            "seguridad" => Ok(Role::Seguridad),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Joven,
    Atencion,
    Formulario,
    Usuario,
    Rol,
    Modulo,
    Permiso,
    Centro,
    Notificacion,
}

/// Static description of one collection
#[derive(Debug)]
pub struct ResourceDef {
    pub kind: ResourceKind,
    pub table: &'static str,
    /// Envelope key for a single record (`{"joven": {...}}`)
    pub singular: &'static str,
    /// Envelope key for listings
    pub plural: &'static str,
    pub fields: &'static [FieldSpec],
    pub required: &'static [&'static str],
    /// Column naming the user a row belongs to, for ownership checks
    pub owner_field: Option<&'static str>,
    /// Column stamped with the caller's id on create
    pub creator_field: Option<&'static str>,
    pub defaults: &'static [(&'static str, DefaultValue)],
    /// Create bodies may carry their own `id` (profiles mirror auth user ids)
    pub accepts_client_id: bool,
    /// Columns only an admin may change once the row exists
    pub fixed_fields: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Text(&'static str),
    Bool(bool),
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Text(s) => Value::String(s.to_string()),
            DefaultValue::Bool(b) => Value::Bool(b),
        }
    }
}

/// Whether a body is a full create or a partial update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeMode {
    Create,
    Update,
}

/// Per-field validation failures, keyed by field name
pub type FieldErrors = BTreeMap<String, String>;

static JOVEN: ResourceDef = ResourceDef {
    kind: ResourceKind::Joven,
    table: "jovenes",
    singular: "joven",
    plural: "jovenes",
    fields: &[
        field("nombres", FieldKind::Text),
        field("apellidos", FieldKind::Text),
        field("fecha_nacimiento", FieldKind::Date),
        field("numero_identidad", FieldKind::Text),
        field("telefono", FieldKind::Text),
        field("direccion", FieldKind::Text),
        field("contacto_emergencia", FieldKind::Text),
        field("telefono_emergencia", FieldKind::Text),
        field("fecha_ingreso", FieldKind::Date),
        field("centro_id", FieldKind::Uuid),
        field("medida_aplicada", FieldKind::Text),
        field("expediente_judicial", FieldKind::Text),
        field("expediente_administrativo", FieldKind::Text),
        field("observaciones", FieldKind::Text),
        field("estado", FieldKind::Enum(ESTADOS_JOVEN)),
        field("foto_url", FieldKind::Text),
    ],
    required: &["nombres", "apellidos", "fecha_nacimiento", "centro_id", "fecha_ingreso"],
    owner_field: None,
    creator_field: None,
    defaults: &[("estado", DefaultValue::Text("activo"))],
    accepts_client_id: false,
    fixed_fields: &[],
};

static ATENCION: ResourceDef = ResourceDef {
    kind: ResourceKind::Atencion,
    table: "atenciones",
    singular: "atencion",
    plural: "atenciones",
    fields: &[
        field("joven_id", FieldKind::Uuid),
        field("tipo_atencion", FieldKind::Enum(TIPOS_ATENCION)),
        field("fecha_atencion", FieldKind::Timestamp),
        field("motivo", FieldKind::Text),
        field("observaciones", FieldKind::Text),
        field("recomendaciones", FieldKind::Text),
        field("estado", FieldKind::Enum(ESTADOS_ATENCION)),
        field("proxima_cita", FieldKind::Timestamp),
    ],
    required: &["joven_id", "tipo_atencion", "fecha_atencion", "motivo"],
    owner_field: Some("profesional_id"),
    creator_field: Some("profesional_id"),
    defaults: &[("estado", DefaultValue::Text("pendiente"))],
    accepts_client_id: false,
    fixed_fields: &[],
};

static FORMULARIO: ResourceDef = ResourceDef {
    kind: ResourceKind::Formulario,
    table: "formularios_atencion",
    singular: "formulario",
    plural: "formularios",
    fields: &[
        field("atencion_id", FieldKind::Uuid),
        field("joven_id", FieldKind::Uuid),
        field("tipo_formulario", FieldKind::Enum(TIPOS_FORMULARIO)),
        field("datos", FieldKind::Json),
    ],
    required: &["tipo_formulario", "datos"],
    owner_field: Some("creado_por"),
    creator_field: Some("creado_por"),
    defaults: &[],
    accepts_client_id: false,
    fixed_fields: &["atencion_id"],
};

static USUARIO: ResourceDef = ResourceDef {
    kind: ResourceKind::Usuario,
    table: "profiles",
    singular: "usuario",
    plural: "usuarios",
    fields: &[
        field("email", FieldKind::Text),
        field("nombre_completo", FieldKind::Text),
        field("rol", FieldKind::Enum(ROLES)),
        field("foto_url", FieldKind::Text),
    ],
    required: &["email", "nombre_completo", "rol"],
    owner_field: None,
    creator_field: None,
    defaults: &[],
    accepts_client_id: true,
    fixed_fields: &[],
};

static ROL: ResourceDef = ResourceDef {
    kind: ResourceKind::Rol,
    table: "roles",
    singular: "rol",
    plural: "roles",
    fields: &[
        field("nombre", FieldKind::Text),
        field("descripcion", FieldKind::Text),
    ],
    required: &["nombre"],
    owner_field: None,
    creator_field: None,
    defaults: &[],
    accepts_client_id: false,
    fixed_fields: &[],
};

static MODULO: ResourceDef = ResourceDef {
    kind: ResourceKind::Modulo,
    table: "modulos",
    singular: "modulo",
    plural: "modulos",
    fields: &[
        field("nombre", FieldKind::Text),
        field("descripcion", FieldKind::Text),
        field("ruta", FieldKind::Text),
    ],
    required: &["nombre"],
    owner_field: None,
    creator_field: None,
    defaults: &[],
    accepts_client_id: false,
    fixed_fields: &[],
};

static PERMISO: ResourceDef = ResourceDef {
    kind: ResourceKind::Permiso,
    table: "permisos",
    singular: "permiso",
    plural: "permisos",
    fields: &[
        field("rol_id", FieldKind::Uuid),
        field("modulo_id", FieldKind::Uuid),
        field("puede_ver", FieldKind::Bool),
        field("puede_crear", FieldKind::Bool),
        field("puede_editar", FieldKind::Bool),
        field("puede_eliminar", FieldKind::Bool),
    ],
    required: &["rol_id", "modulo_id"],
    owner_field: None,
    creator_field: None,
    defaults: &[
        ("puede_ver", DefaultValue::Bool(false)),
        ("puede_crear", DefaultValue::Bool(false)),
        ("puede_editar", DefaultValue::Bool(false)),
        ("puede_eliminar", DefaultValue::Bool(false)),
    ],
    accepts_client_id: false,
    fixed_fields: &[],
};

static CENTRO: ResourceDef = ResourceDef {
    kind: ResourceKind::Centro,
    table: "centros",
    singular: "centro",
    plural: "centros",
    fields: &[
        field("nombre", FieldKind::Text),
        field("direccion", FieldKind::Text),
        field("telefono", FieldKind::Text),
        field("capacidad", FieldKind::Int),
        field("activo", FieldKind::Bool),
    ],
    required: &["nombre"],
    owner_field: None,
    creator_field: None,
    defaults: &[("activo", DefaultValue::Bool(true))],
    accepts_client_id: false,
    fixed_fields: &[],
};

static NOTIFICACION: ResourceDef = ResourceDef {
    kind: ResourceKind::Notificacion,
    table: "notificaciones",
    singular: "notificacion",
    plural: "notificaciones",
    fields: &[
        field("usuario_id", FieldKind::Uuid),
        field("titulo", FieldKind::Text),
        field("mensaje", FieldKind::Text),
        field("tipo", FieldKind::Enum(TIPOS_NOTIFICACION)),
        field("prioridad", FieldKind::Enum(PRIORIDADES)),
        field("leida", FieldKind::Bool),
        field("fecha_lectura", FieldKind::Timestamp),
        field("joven_id", FieldKind::Uuid),
        field("atencion_id", FieldKind::Uuid),
    ],
    required: &["usuario_id", "titulo", "mensaje", "tipo"],
    owner_field: Some("usuario_id"),
    creator_field: None,
    defaults: &[
        ("prioridad", DefaultValue::Text("media")),
        ("leida", DefaultValue::Bool(false)),
    ],
    accepts_client_id: false,
    fixed_fields: &["usuario_id"],
};

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Joven,
        ResourceKind::Atencion,
        ResourceKind::Formulario,
        ResourceKind::Usuario,
        ResourceKind::Rol,
        ResourceKind::Modulo,
        ResourceKind::Permiso,
        ResourceKind::Centro,
        ResourceKind::Notificacion,
    ];

    pub fn def(&self) -> &'static ResourceDef {
        match self {
            ResourceKind::Joven => &JOVEN,
            ResourceKind::Atencion => &ATENCION,
            ResourceKind::Formulario => &FORMULARIO,
            ResourceKind::Usuario => &USUARIO,
            ResourceKind::Rol => &ROL,
            ResourceKind::Modulo => &MODULO,
            ResourceKind::Permiso => &PERMISO,
            ResourceKind::Centro => &CENTRO,
            ResourceKind::Notificacion => &NOTIFICACION,
        }
    }

    pub fn table(&self) -> &'static str {
        self.def().table
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.def().singular)
    }
}

impl ResourceDef {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is a column a client can filter listings on
    pub fn is_filterable(&self, name: &str) -> bool {
        name == "id"
            || self.field(name).is_some()
            || self.owner_field == Some(name)
            || self.creator_field == Some(name)
    }

    /// Reduce a request body to the recognised writable fields.
    ///
    /// Unknown keys are dropped, server-managed keys are dropped, every kept
    /// value is type-checked, and on create the required fields must be
    /// present and non-blank. All failures are reported together.
    pub fn sanitize(&self, body: &Value, mode: SanitizeMode) -> Result<Map<String, Value>, FieldErrors> {
        let input = match body {
            Value::Object(map) => map,
            _ => {
                let mut errors = FieldErrors::new();
                errors.insert("_body".to_string(), "expected a JSON object".to_string());
                return Err(errors);
            }
        };

        let mut out = Map::new();
        let mut errors = FieldErrors::new();

        for (key, value) in input {
            if key == "id" && self.accepts_client_id && mode == SanitizeMode::Create {
                match fields::field("id", FieldKind::Uuid).check(value) {
                    Ok(v) if !v.is_null() => {
                        out.insert(key.clone(), v);
                    }
                    Ok(_) => {}
                    Err(msg) => {
                        errors.insert(key.clone(), msg);
                    }
                }
                continue;
            }

            let Some(spec) = self.field(key) else {
                tracing::debug!(resource = %self.kind, field = %key, "ignoring unrecognised field");
                continue;
            };

            match spec.check(value) {
                Ok(v) => {
                    if v.is_null() && self.required.contains(&spec.name) {
                        errors.insert(key.clone(), "This field is required".to_string());
                    } else {
                        out.insert(key.clone(), v);
                    }
                }
                Err(msg) => {
                    errors.insert(key.clone(), msg);
                }
            }
        }

        if mode == SanitizeMode::Create {
            for name in self.required {
                if is_blank(out.get(*name)) && !errors.contains_key(*name) {
                    errors.insert(name.to_string(), "This field is required".to_string());
                }
            }
        } else {
            // Blank text cannot clear a required column on update either
            for name in self.required {
                if out.contains_key(*name) && is_blank(out.get(*name)) && !errors.contains_key(*name) {
                    errors.insert(name.to_string(), "This field is required".to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(errors)
        }
    }

    /// Fill server defaults for keys the client did not send
    pub fn apply_defaults(&self, fields: &mut Map<String, Value>) {
        for (name, default) in self.defaults {
            if is_blank(fields.get(*name)) {
                fields.insert(name.to_string(), default.to_value());
            }
        }
    }

    /// Owner of a stored row, if this resource tracks one
    pub fn owner_of<'a>(&self, row: &'a Map<String, Value>) -> Option<&'a str> {
        self.owner_field.and_then(|f| row.get(f)).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_drops_unknown_and_system_fields() {
        let body = json!({
            "nombres": "Ana",
            "apodo": "ignored",
            "id": "11111111-1111-4111-8111-111111111111",
            "created_at": "2020-01-01T00:00:00Z",
            "edad": 99
        });
        let out = ResourceKind::Joven.def().sanitize(&body, SanitizeMode::Update).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["nombres"], json!("Ana"));
    }

    #[test]
    fn sanitize_create_reports_all_missing_required() {
        let body = json!({ "nombres": "Ana" });
        let errors = ResourceKind::Joven.def().sanitize(&body, SanitizeMode::Create).unwrap_err();
        assert!(errors.contains_key("apellidos"));
        assert!(errors.contains_key("fecha_nacimiento"));
        assert!(errors.contains_key("centro_id"));
        assert!(errors.contains_key("fecha_ingreso"));
        assert!(!errors.contains_key("nombres"));
    }

    #[test]
    fn sanitize_update_rejects_blanking_required_field() {
        let body = json!({ "apellidos": "   " });
        let errors = ResourceKind::Joven.def().sanitize(&body, SanitizeMode::Update).unwrap_err();
        assert_eq!(errors["apellidos"], "This field is required");
    }

    #[test]
    fn sanitize_update_allows_clearing_optional_field() {
        let body = json!({ "observaciones": null });
        let out = ResourceKind::Joven.def().sanitize(&body, SanitizeMode::Update).unwrap();
        assert_eq!(out["observaciones"], Value::Null);
    }

    #[test]
    fn creator_field_is_never_client_writable() {
        let body = json!({ "motivo": "control", "profesional_id": "11111111-1111-4111-8111-111111111111" });
        let out = ResourceKind::Atencion.def().sanitize(&body, SanitizeMode::Update).unwrap();
        assert!(!out.contains_key("profesional_id"));
    }

    #[test]
    fn profiles_accept_client_id_on_create() {
        let body = json!({
            "id": "11111111-1111-4111-8111-111111111111",
            "email": "a@b.c",
            "nombre_completo": "A B",
            "rol": "medico"
        });
        let out = ResourceKind::Usuario.def().sanitize(&body, SanitizeMode::Create).unwrap();
        assert_eq!(out["id"], json!("11111111-1111-4111-8111-111111111111"));
    }

    #[test]
    fn defaults_fill_only_missing_values() {
        let mut fields = Map::new();
        ResourceKind::Joven.def().apply_defaults(&mut fields);
        assert_eq!(fields["estado"], json!("activo"));

        let mut fields = Map::new();
        fields.insert("estado".into(), json!("trasladado"));
        ResourceKind::Joven.def().apply_defaults(&mut fields);
        assert_eq!(fields["estado"], json!("trasladado"));
    }

    #[test]
    fn role_round_trips_through_str() {
        for name in ROLES {
            let role: Role = name.parse().unwrap();
            assert_eq!(role.as_str(), *name);
        }
        assert!("root".parse::<Role>().is_err());
    }
}
