//! Form schema and sheet column layout.
//!
//! The schema drives three things at once: the order of the form on screen,
//! the order of sections and labels in the printed report, and (through
//! [`COLUMNS`]) the column order of the sheet.

use chrono::Local;
use std::collections::BTreeMap;

/// Label of the required sample number field. It is also the lookup key.
pub const IDENTIFIER_LABEL: &str = "n.º da Amostra";

/// Header of the identifier column in the sheet.
pub const IDENTIFIER_HEADER: &str = "n.º da Amostra";

/// Service order field. Lives in the trailing column, outside the append span.
pub const OS_LABEL: &str = "Ordem de Serviço (O.S.)";

/// Name of the worksheet inside the spreadsheet.
pub const DEFAULT_SHEET_NAME: &str = "Geral";

/// Default value declared for a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultValue {
    Text(&'static str),
    Flag(bool),
    /// Today's date as `dd/mm/YYYY`, evaluated when the form is seeded.
    Today,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Flag,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    pub label: &'static str,
    pub default: DefaultValue,
}

#[derive(Clone, Copy, Debug)]
pub struct Section {
    pub title: &'static str,
    pub fields: &'static [FieldDef],
}

const fn text(label: &'static str, default: &'static str) -> FieldDef {
    FieldDef {
        label,
        default: DefaultValue::Text(default),
    }
}

const fn flag(label: &'static str) -> FieldDef {
    FieldDef {
        label,
        default: DefaultValue::Flag(false),
    }
}

pub static FORM_SCHEMA: &[Section] = &[
    Section {
        title: "Geral",
        fields: &[
            text("Estado de Origem", "AM"),
            text("Cliente", "Pie - Oliveira Energia"),
            FieldDef {
                label: "Data da coleta",
                default: DefaultValue::Today,
            },
            text("Local de operação:", ""),
            text("UGD:", ""),
            text("Responsável Pela Coleta:", ""),
            text(IDENTIFIER_LABEL, ""),
            text(OS_LABEL, ""),
        ],
    },
    Section {
        title: "Equipamento",
        fields: &[
            text("n.º de série:", ""),
            text("Frota:", ""),
            text("Horímetro do Óleo:", ""),
            flag("Houve troca de óleo após coleta?"),
            flag("Trocado o filtro após coleta?"),
            flag("Houve mudança do local de operação?"),
            text("Fabricante do Equipamento:", "Scania"),
            text("Modelo:", "DC13"),
            text("Horímetro do Motor", ""),
        ],
    },
    Section {
        title: "Óleo",
        fields: &[
            flag("Houve complemento de óleo?"),
            text("Se sim, quantos litros?", ""),
            text("Amostra coletada:", "Motor"),
            text("Fabricante:", "Mobil"),
            text("Grau de viscosidade:", "15W40"),
            text("Nome:", "Mobil Delvac"),
            flag("Apresentou limalha no filtro ou na tela?"),
            flag("Apresentou limalhas no bujão magnético?"),
            flag("Equipamento apresentou ruído anormal?"),
            flag("Existem vazamentos no sistema?"),
            flag("A temperatura de operação está normal?"),
            flag("O desempenho do sistema está normal?"),
            text("Detalhes das anormalidades (caso Haja):", ""),
        ],
    },
    Section {
        title: "Contato",
        fields: &[
            text("Pessoa de contato:", "Francisco Sampaio"),
            text("Telefone:", "(92) 99437-6579"),
        ],
    },
];

/// Where a sheet column takes its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnSource {
    /// A form field, by label.
    Field(&'static str),
    /// Owned by the sheet (status tracking); never edited through the form.
    StoreOnly,
}

#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub header: &'static str,
    pub source: ColumnSource,
}

const fn col(header: &'static str, label: &'static str) -> Column {
    Column {
        header,
        source: ColumnSource::Field(label),
    }
}

const fn store_only(header: &'static str) -> Column {
    Column {
        header,
        source: ColumnSource::StoreOnly,
    }
}

/// Sheet columns in order, A through AH.
pub static COLUMNS: &[Column] = &[
    col("Estado de Origem", "Estado de Origem"),
    col("Cliente", "Cliente"),
    col("Data da coleta", "Data da coleta"),
    col("Local de operação", "Local de operação:"),
    col("UGD", "UGD:"),
    col("Responsável Pela Coleta", "Responsável Pela Coleta:"),
    col(IDENTIFIER_HEADER, IDENTIFIER_LABEL),
    col("n.º de série Equipamento", "n.º de série:"),
    col("Frota", "Frota:"),
    col("Horímetro do Óleo", "Horímetro do Óleo:"),
    col(
        "Houve troca de óleo após coleta?",
        "Houve troca de óleo após coleta?",
    ),
    col("Troca de Filtro após coleta", "Trocado o filtro após coleta?"),
    col(
        "Houve mudança do local de operação?",
        "Houve mudança do local de operação?",
    ),
    col("Fabricante", "Fabricante do Equipamento:"),
    col("Modelo", "Modelo:"),
    col("Horímetro do Motor", "Horímetro do Motor"),
    col("Houve complemento de óleo", "Houve complemento de óleo?"),
    col("Se sim, quantos litros", "Se sim, quantos litros?"),
    col("Amostra coletada", "Amostra coletada:"),
    col("Fabricante do Óleo", "Fabricante:"),
    col("Grau de viscosidade", "Grau de viscosidade:"),
    col("Nome", "Nome:"),
    col(
        "Apresentou limalha no filtro ou na tela?",
        "Apresentou limalha no filtro ou na tela?",
    ),
    col(
        "Apresentou limalhas no bujão magnético?",
        "Apresentou limalhas no bujão magnético?",
    ),
    col(
        "Equipamento apresentou ruído anormal?",
        "Equipamento apresentou ruído anormal?",
    ),
    col("Existem vazamentos no sistema", "Existem vazamentos no sistema?"),
    col(
        "A temperatura de operação está normal?",
        "A temperatura de operação está normal?",
    ),
    col(
        "O desempenho do sistema está normal?",
        "O desempenho do sistema está normal?",
    ),
    col(
        "Detalhes das anormalidades (caso Haja)",
        "Detalhes das anormalidades (caso Haja):",
    ),
    col("Pessoa de contato", "Pessoa de contato:"),
    col("Telefone", "Telefone:"),
    store_only("Status"),
    store_only("Data Status"),
    col("O.S.", OS_LABEL),
];

/// Number of leading columns written by an append (A..AG). The O.S. column
/// after them is filled by a follow-up single-cell update.
pub const APPEND_WIDTH: usize = 33;

/// A field value tagged with the kind the schema declares for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

impl FieldValue {
    /// Cell text written to the sheet and printed in the report.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Flag(true) => "Sim".to_string(),
            FieldValue::Flag(false) => "Não".to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }
}

/// Label -> value for every field of one submission.
pub type ResponseRecord = BTreeMap<String, FieldValue>;

impl FieldDef {
    pub fn kind(&self) -> FieldKind {
        match self.default {
            DefaultValue::Flag(_) => FieldKind::Flag,
            DefaultValue::Text(_) | DefaultValue::Today => FieldKind::Text,
        }
    }

    pub fn default_value(&self) -> FieldValue {
        match self.default {
            DefaultValue::Text(text) => FieldValue::Text(text.to_string()),
            DefaultValue::Flag(value) => FieldValue::Flag(value),
            DefaultValue::Today => FieldValue::Text(Local::now().format("%d/%m/%Y").to_string()),
        }
    }

    /// Read a raw sheet cell back into this field's kind.
    ///
    /// Flags go through [`parse_flag`]; unrecognised text falls back to the
    /// field's default. Text cells are taken verbatim.
    pub fn value_from_cell(&self, raw: &str) -> FieldValue {
        match self.kind() {
            FieldKind::Text => FieldValue::Text(raw.to_string()),
            FieldKind::Flag => match parse_flag(raw) {
                Some(value) => FieldValue::Flag(value),
                None => self.default_value(),
            },
        }
    }
}

/// Fixed yes/no vocabulary used in the sheet.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "sim" | "s" | "true" | "1" | "yes" => Some(true),
        "não" | "nao" | "n" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// All fields, in form order.
pub fn fields() -> impl Iterator<Item = &'static FieldDef> {
    FORM_SCHEMA.iter().flat_map(|section| section.fields.iter())
}

pub fn field(label: &str) -> Option<&'static FieldDef> {
    fields().find(|def| def.label == label)
}

/// A record holding every field at its default.
pub fn defaults() -> ResponseRecord {
    fields()
        .map(|def| (def.label.to_string(), def.default_value()))
        .collect()
}
