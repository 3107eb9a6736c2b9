use serde::{Deserialize, Serialize};

pub type PersonId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    Frontend,
    Backend,
    UiUx,
    Test,
    Pm,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Frontend => "frontend",
            Position::Backend => "backend",
            Position::UiUx => "ui_ux",
            Position::Test => "test",
            Position::Pm => "pm",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "frontend" => Some(Position::Frontend),
            "backend" => Some(Position::Backend),
            "ui_ux" => Some(Position::UiUx),
            "test" => Some(Position::Test),
            "pm" => Some(Position::Pm),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Position::Frontend => "Frontend Developer",
            Position::Backend => "Backend Developer",
            Position::UiUx => "UI/UX Designer",
            Position::Test => "Tester",
            Position::Pm => "Project manager or Production manager",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    TechTeam,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::TechTeam => "tech_team",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "tech_team" => Some(Department::TechTeam),
            _ => None,
        }
    }
}

/// A team member who owns a work calendar and a set of assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
}

impl Person {
    pub fn new(id: PersonId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Position::default(),
            department: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}
