use serde::{Deserialize, Serialize};

/// Authenticated user record as returned by the profile and login endpoints.
///
/// The backend omits fields freely depending on the endpoint, so every field
/// defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub user_name: String,
    pub tipo_identificacion: String,
    pub numero_identificacion: String,
    pub names: String,
    pub surnames: String,
    pub full_name: String,
    pub fecha_nacimiento: String,
    pub sexo: String,
    pub ciudad: String,
    pub pais: String,
    pub direccion: String,
    pub department: String,
    pub phone_number: String,
    pub employee_code: String,
    pub roles: Vec<String>,
    pub last_login_at: Option<String>,
    pub is_active: bool,
    pub created_at: Option<String>,
}

impl User {
    /// Full name, falling back to "names surnames" and then the email.
    pub fn display_name(&self) -> String {
        if !self.full_name.trim().is_empty() {
            return self.full_name.trim().to_string();
        }
        let joined = format!("{} {}", self.names.trim(), self.surnames.trim());
        let joined = joined.trim();
        if joined.is_empty() {
            self.email.clone()
        } else {
            joined.to_string()
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn roles_display(&self) -> String {
        if self.roles.is_empty() {
            "none".to_string()
        } else {
            self.roles.join(", ")
        }
    }
}

/// Partial profile update. Only fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surnames: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_identificacion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_identificacion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_nacimiento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sexo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciudad: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pais: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_code: Option<String>,
}

impl ProfileUpdate {
    /// Set a field by its wire name (`phoneNumber`) or snake_case name
    /// (`phone_number`). Returns false for unknown fields.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "email" => &mut self.email,
            "names" => &mut self.names,
            "surnames" => &mut self.surnames,
            "tipoIdentificacion" | "tipo_identificacion" => &mut self.tipo_identificacion,
            "numeroIdentificacion" | "numero_identificacion" => &mut self.numero_identificacion,
            "fechaNacimiento" | "fecha_nacimiento" => &mut self.fecha_nacimiento,
            "sexo" => &mut self.sexo,
            "ciudad" => &mut self.ciudad,
            "pais" => &mut self.pais,
            "direccion" => &mut self.direccion,
            "department" => &mut self.department,
            "phoneNumber" | "phone_number" => &mut self.phone_number,
            "employeeCode" | "employee_code" => &mut self.employee_code,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
