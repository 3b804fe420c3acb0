use itertools::Itertools;

// The info field records where a node of generated code originates from: a path of labels such
// as the histogram operation, the operator, and the compilation stage that produced it. Error
// messages refer back to this path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Info {
    path: Vec<String>
}

impl Info {
    pub fn new(label: &str) -> Info {
        Info {path: vec![label.to_string()]}
    }

    pub fn with_label(mut self, label: &str) -> Info {
        self.path.push(label.to_string());
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.path.is_empty()
    }

    pub fn merge(l: Info, r: Info) -> Info {
        if l.path.len() >= r.path.len() { l } else { r }
    }

    pub fn error_msg(&self, msg: String) -> String {
        if self.is_unknown() {
            msg
        } else {
            format!("{msg}\n\nIn {0}", self.path.iter().join(" > "))
        }
    }
}

pub trait InfoNode {
    fn get_info(&self) -> Info;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_info_keeps_message() {
        let i = Info::default();
        assert_eq!(i.error_msg("x".to_string()), "x");
    }

    #[test]
    fn error_message_includes_label_path() {
        let i = Info::new("hist").with_label("op 1");
        assert_eq!(i.error_msg("bad".to_string()), "bad\n\nIn hist > op 1");
    }

    #[test]
    fn merge_prefers_more_specific_info() {
        let l = Info::new("a");
        let r = Info::new("a").with_label("b");
        assert_eq!(Info::merge(l, r.clone()), r);
    }
}
