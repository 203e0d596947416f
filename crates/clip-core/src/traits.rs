//! Record accessor capability
//!
//! Path callbacks and interpolation read the owning record through this
//! trait instead of reflecting over the model.

use crate::inflector::{pluralize, underscore};

/// Primary key type
pub type Id = i64;

/// Read-only view of the record that owns an attachment
pub trait Record: Send + Sync {
    /// Primary key, `None` until the record is persisted
    fn id(&self) -> Option<Id>;

    /// Model type name, e.g. `"BlogPost"`
    fn type_name(&self) -> &str;

    /// Named attribute value, if the record exposes it
    fn field(&self, _name: &str) -> Option<String> {
        None
    }

    /// Singular underscored type name, e.g. `"blog_post"`
    fn param_key(&self) -> String {
        underscore(self.type_name())
    }

    /// Plural underscored type name, e.g. `"blog_posts"`
    fn table_name(&self) -> String {
        pluralize(&self.param_key())
    }

    fn is_persisted(&self) -> bool {
        self.id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BlogPost {
        id: Option<Id>,
        title: String,
    }

    impl Record for BlogPost {
        fn id(&self) -> Option<Id> {
            self.id
        }

        fn type_name(&self) -> &str {
            "BlogPost"
        }

        fn field(&self, name: &str) -> Option<String> {
            match name {
                "title" => Some(self.title.clone()),
                _ => None,
            }
        }
    }

    #[test]
    fn test_derived_names() {
        let post = BlogPost {
            id: Some(3),
            title: "Hello".into(),
        };

        assert_eq!(post.param_key(), "blog_post");
        assert_eq!(post.table_name(), "blog_posts");
        assert!(post.is_persisted());
        assert_eq!(post.field("title").as_deref(), Some("Hello"));
        assert_eq!(post.field("body"), None);
    }

    #[test]
    fn test_new_record() {
        let post = BlogPost {
            id: None,
            title: String::new(),
        };
        assert!(!post.is_persisted());
    }
}
