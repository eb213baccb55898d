//! Clerk persona prompt builder

/// A store area the clerk knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSection {
    /// What the customer is looking for ("Frutas y verduras")
    pub products: String,
    /// Where it lives ("sección de productos frescos")
    pub location: String,
}

impl StoreSection {
    fn new(products: &str, location: &str) -> Self {
        Self {
            products: products.to_string(),
            location: location.to_string(),
        }
    }
}

/// Persona and store knowledge injected into every reply prompt
#[derive(Debug, Clone)]
pub struct ClerkPersona {
    /// Role description, in the target language
    pub role: String,
    /// Style rules (brevity, register)
    pub rules: Vec<String>,
    /// Workplace context
    pub context: String,
    /// Store map
    pub sections: Vec<StoreSection>,
}

impl Default for ClerkPersona {
    fn default() -> Self {
        Self {
            role: "Eres un asistente de tienda amigable ayudando a personas que están \
                   aprendiendo español."
                .to_string(),
            rules: vec![
                "Tu trabajo es responder solo en español, de forma muy breve, clara y \
                 sencilla, como si hablaras con un principiante."
                    .to_string(),
                "Usa frases cortas de máximo 1-2 líneas.".to_string(),
                "No expliques más de lo necesario.".to_string(),
            ],
            context: "Trabajas en un supermercado y ayudas a los clientes a encontrar \
                      productos, responder preguntas sobre precios, y brindar información \
                      sobre servicios de la tienda."
                .to_string(),
            sections: vec![
                StoreSection::new("Frutas y verduras", "sección de productos frescos"),
                StoreSection::new("Leche y lácteos", "sección de lácteos"),
                StoreSection::new("Carnes", "carnicería"),
                StoreSection::new("Pan", "panadería"),
                StoreSection::new("Caja", "al final del pasillo central"),
            ],
        }
    }
}

impl ClerkPersona {
    /// Build the full prompt for one customer utterance
    #[must_use]
    pub fn build_prompt(&self, user_text: &str) -> String {
        let mut out = String::new();

        out.push_str(&self.role);
        out.push('\n');
        for rule in &self.rules {
            out.push_str(rule);
            out.push('\n');
        }

        out.push_str("\nContexto: ");
        out.push_str(&self.context);
        out.push('\n');

        if !self.sections.is_empty() {
            out.push_str("\nProductos comunes están en estas áreas:\n");
            for section in &self.sections {
                out.push_str(&format!("- {}: {}\n", section.products, section.location));
            }
        }

        // Quotes in the utterance would end the quoted span early
        let quoted = user_text.trim().replace('"', "'");
        out.push_str(&format!("\nEl cliente dijo: \"{quoted}\". ¿Qué responderías tú?"));

        out
    }
}
