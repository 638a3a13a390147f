// ABOUTME: Integration tests for image references, slot colors, slot names and ids.
// ABOUTME: Tests parsing, validation, and the container names slots map to.

use slotctl::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_simple_name() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert!(img.digest().is_none());
    }

    #[test]
    fn parse_name_with_tag() {
        let img = ImageRef::parse("nginx:1.25").unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.tag(), Some("1.25"));
    }

    #[test]
    fn parse_with_registry() {
        let img = ImageRef::parse("registry.example.com/myapp:v1.2.3").unwrap();
        assert_eq!(img.registry(), Some("registry.example.com"));
        assert_eq!(img.name(), "myapp");
        assert_eq!(img.tag(), Some("v1.2.3"));
    }

    #[test]
    fn parse_with_org() {
        let img = ImageRef::parse("ghcr.io/org/repo:latest").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "org/repo");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn parse_with_digest() {
        let digest = "sha256:abc123def456";
        let img = ImageRef::parse(&format!("nginx@{}", digest)).unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.digest(), Some(digest));
        assert!(img.tag().is_none());
    }

    #[test]
    fn parse_full_reference() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1@sha256:abc123").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "org/repo");
        assert_eq!(img.tag(), Some("v1"));
        assert_eq!(img.digest(), Some("sha256:abc123"));
    }

    #[test]
    fn parse_empty_returns_error() {
        assert!(ImageRef::parse("").is_err());
    }

    #[test]
    fn parse_invalid_chars_returns_error() {
        assert!(ImageRef::parse("invalid image!").is_err());
    }

    #[test]
    fn display_formats_correctly() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1").unwrap();
        assert_eq!(img.to_string(), "ghcr.io/org/repo:v1");
    }

    #[test]
    fn repository_drops_tag_and_digest() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1@sha256:abc123").unwrap();
        assert_eq!(img.repository(), "ghcr.io/org/repo");
        assert!(img.same_repository(&ImageRef::parse("ghcr.io/org/repo:v2").unwrap()));
        assert!(!img.same_repository(&ImageRef::parse("docker.io/org/repo:v1").unwrap()));
    }

    #[test]
    fn serializes_as_string() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1").unwrap();
        let json = serde_json::to_string(&img).unwrap();
        assert_eq!(json, "\"ghcr.io/org/repo:v1\"");
        let back: ImageRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, img);
    }
}

mod slot_color_tests {
    use super::*;

    #[test]
    fn colors_are_complementary() {
        assert_eq!(SlotColor::Blue.other(), SlotColor::Green);
        assert_eq!(SlotColor::Green.other(), SlotColor::Blue);
    }

    #[test]
    fn parses_lowercase_names() {
        assert_eq!("blue".parse::<SlotColor>().unwrap(), SlotColor::Blue);
        assert_eq!("green".parse::<SlotColor>().unwrap(), SlotColor::Green);
        assert!("red".parse::<SlotColor>().is_err());
        assert!("Blue".parse::<SlotColor>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SlotColor::Green).unwrap(), "\"green\"");
    }
}

mod slot_name_tests {
    use super::*;

    #[test]
    fn container_names_carry_color_suffix() {
        let name = SlotName::new("shop-prod").unwrap();
        assert_eq!(name.container_name(SlotColor::Blue), "shop-prod-blue");
        assert_eq!(name.container_id(SlotColor::Green).as_str(), "shop-prod-green");
    }

    #[test]
    fn empty_returns_error() {
        assert_eq!(SlotName::new("   "), Err(SlotNameError::Empty));
    }

    #[test]
    fn too_long_returns_error() {
        let long_name = "a".repeat(SlotName::MAX_LEN + 1);
        assert!(SlotName::new(&long_name).is_err());
        assert!(SlotName::new(&"a".repeat(SlotName::MAX_LEN)).is_ok());
    }

    #[test]
    fn hyphen_at_edges_returns_error() {
        assert_eq!(SlotName::new("-shop"), Err(SlotNameError::EdgeHyphen));
        assert_eq!(SlotName::new("shop-"), Err(SlotNameError::EdgeHyphen));
    }

    #[test]
    fn uppercase_and_symbols_return_error() {
        assert_eq!(SlotName::new("Shop"), Err(SlotNameError::InvalidChar('S')));
        assert!(SlotName::new("shop_prod").is_err());
        assert!(SlotName::new("shop prod").is_err());
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn container_id_stores_value() {
        let id = ContainerId::new("abc123".to_string());
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn image_id_stores_value() {
        let id = ImageId::new("sha256:abc".to_string());
        assert_eq!(id.into_inner(), "sha256:abc");
    }
}
